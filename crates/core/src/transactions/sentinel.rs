use std::fmt;

/// A mandatory field that may carry the `unknown` sentinel.
///
/// Ingestion adapters often cannot observe a value (a counterparty
/// exchange, a spot price) even though the field itself always applies to
/// the record. `UnknownOr` keeps that case distinct from `Option`, which
/// is reserved for fields that are structurally absent from a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnknownOr<T> {
    Known(T),
    Unknown,
}

impl<T> UnknownOr<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, UnknownOr::Unknown)
    }

    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            UnknownOr::Known(value) => Some(value),
            UnknownOr::Unknown => None,
        }
    }

    pub fn into_known(self) -> Option<T> {
        match self {
            UnknownOr::Known(value) => Some(value),
            UnknownOr::Unknown => None,
        }
    }

    pub fn as_ref(&self) -> UnknownOr<&T> {
        match self {
            UnknownOr::Known(value) => UnknownOr::Known(value),
            UnknownOr::Unknown => UnknownOr::Unknown,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> UnknownOr<U> {
        match self {
            UnknownOr::Known(value) => UnknownOr::Known(f(value)),
            UnknownOr::Unknown => UnknownOr::Unknown,
        }
    }

    /// Picks the known value when exactly one of the two is known.
    ///
    /// Returns `Err` with both values when the two are known and disagree;
    /// two unknowns resolve to `Unknown`.
    pub fn reconcile(self, other: UnknownOr<T>) -> Result<UnknownOr<T>, (T, T)>
    where
        T: PartialEq,
    {
        match (self, other) {
            (UnknownOr::Known(a), UnknownOr::Known(b)) => {
                if a == b {
                    Ok(UnknownOr::Known(a))
                } else {
                    Err((a, b))
                }
            }
            (UnknownOr::Known(a), UnknownOr::Unknown) => Ok(UnknownOr::Known(a)),
            (UnknownOr::Unknown, UnknownOr::Known(b)) => Ok(UnknownOr::Known(b)),
            (UnknownOr::Unknown, UnknownOr::Unknown) => Ok(UnknownOr::Unknown),
        }
    }
}

impl<T> Default for UnknownOr<T> {
    fn default() -> Self {
        UnknownOr::Unknown
    }
}

impl<T> From<T> for UnknownOr<T> {
    fn from(value: T) -> Self {
        UnknownOr::Known(value)
    }
}

impl<T: fmt::Display> fmt::Display for UnknownOr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownOr::Known(value) => value.fmt(f),
            UnknownOr::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_prefers_known() {
        assert_eq!(
            UnknownOr::Known(3).reconcile(UnknownOr::Unknown),
            Ok(UnknownOr::Known(3))
        );
        assert_eq!(
            UnknownOr::Unknown.reconcile(UnknownOr::Known(7)),
            Ok(UnknownOr::Known(7))
        );
        assert_eq!(
            UnknownOr::<i32>::Unknown.reconcile(UnknownOr::Unknown),
            Ok(UnknownOr::Unknown)
        );
    }

    #[test]
    fn test_reconcile_conflict() {
        assert_eq!(UnknownOr::Known(1).reconcile(UnknownOr::Known(2)), Err((1, 2)));
        assert_eq!(
            UnknownOr::Known(5).reconcile(UnknownOr::Known(5)),
            Ok(UnknownOr::Known(5))
        );
    }

    #[test]
    fn test_display_sentinel() {
        assert_eq!(UnknownOr::Known("Kraken").to_string(), "Kraken");
        assert_eq!(UnknownOr::<&str>::Unknown.to_string(), "unknown");
    }
}
