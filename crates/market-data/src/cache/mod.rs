//! Persistent cache of fetched historical bars.
//!
//! Keyed by `(source, base, quote, bucket)`, where `bucket` is the lookup
//! timestamp floored to the source's bar granularity. Historical bars are
//! immutable once finalized, so entries never expire; "not found" results
//! are not cached and get retried on the next run.
//!
//! The map is shared across concurrent fetch workers. Entries are written
//! with insert-if-absent semantics; two workers racing on the same key
//! settle on whichever bar lands first, which is safe because bars for a
//! finalized window are identical.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::MarketDataError;
use crate::models::{BarGranularity, HistoricalBar};

/// Cache key for one bar lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarKey {
    pub source: String,
    pub base: String,
    pub quote: String,
    pub bucket: DateTime<Utc>,
}

impl BarKey {
    pub fn new(
        source: &str,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
        granularity: BarGranularity,
    ) -> Self {
        Self {
            source: source.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            bucket: granularity.floor(at),
        }
    }
}

/// On-disk snapshot format. A flat entry list keeps the file mergeable
/// and independent of map iteration order.
#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    entries: Vec<(BarKey, HistoricalBar)>,
}

/// Shared read/write cache of historical bars with optional disk
/// persistence. Opened at run start, flushed at run end.
pub struct BarCache {
    entries: DashMap<BarKey, HistoricalBar>,
    path: Option<PathBuf>,
}

impl BarCache {
    /// A purely in-memory cache, used by tests and one-shot runs.
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            path: None,
        }
    }

    /// Opens a cache backed by a JSON file, loading any previous snapshot.
    /// A missing file starts an empty cache; a corrupt one is an error so
    /// the user can delete it deliberately rather than lose it silently.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let path = path.as_ref().to_path_buf();
        let entries = DashMap::new();

        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| MarketDataError::CacheStore(format!("{}: {}", path.display(), e)))?;
            let snapshot: CacheSnapshot = serde_json::from_str(&raw).map_err(|e| {
                MarketDataError::CacheStore(format!(
                    "cache format error in {}: {} (delete the file and rerun)",
                    path.display(),
                    e
                ))
            })?;
            for (key, bar) in snapshot.entries {
                entries.insert(key, bar);
            }
            log::debug!("Loaded {} cached bars from {}", entries.len(), path.display());
        }

        Ok(Self {
            entries,
            path: Some(path),
        })
    }

    pub fn get(&self, key: &BarKey) -> Option<HistoricalBar> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts the bar unless a bar is already present for the key, and
    /// returns the bar that ended up in the cache.
    pub fn insert_if_absent(&self, key: BarKey, bar: HistoricalBar) -> HistoricalBar {
        self.entries.entry(key).or_insert(bar).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the current contents to disk. The snapshot is written to a
    /// sibling temp file first and renamed into place, so an interrupted
    /// flush leaves the previous snapshot intact.
    pub fn flush(&self) -> Result<(), MarketDataError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let snapshot = CacheSnapshot {
            entries: self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };
        let raw = serde_json::to_string(&snapshot)
            .map_err(|e| MarketDataError::CacheStore(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| MarketDataError::CacheStore(e.to_string()))?;
            }
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw).map_err(|e| MarketDataError::CacheStore(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| MarketDataError::CacheStore(e.to_string()))?;
        log::debug!("Flushed {} bars to {}", self.entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn sample_bar() -> HistoricalBar {
        let start = Utc.with_ymd_and_hms(2022, 3, 1, 10, 15, 0).unwrap();
        HistoricalBar {
            start,
            end: start + Duration::minutes(1),
            open: dec!(41000),
            high: dec!(41200),
            low: dec!(40900),
            close: dec!(41100),
        }
    }

    fn sample_key() -> BarKey {
        BarKey::new(
            "Kraken",
            "BTC",
            "USD",
            Utc.with_ymd_and_hms(2022, 3, 1, 10, 15, 42).unwrap(),
            BarGranularity::Minute,
        )
    }

    #[test]
    fn test_key_buckets_within_granularity() {
        let a = BarKey::new(
            "Kraken",
            "BTC",
            "USD",
            Utc.with_ymd_and_hms(2022, 3, 1, 10, 15, 3).unwrap(),
            BarGranularity::Minute,
        );
        let b = BarKey::new(
            "Kraken",
            "BTC",
            "USD",
            Utc.with_ymd_and_hms(2022, 3, 1, 10, 15, 59).unwrap(),
            BarGranularity::Minute,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_insert_if_absent_keeps_first() {
        let cache = BarCache::in_memory();
        let key = sample_key();
        let first = sample_bar();
        let mut second = sample_bar();
        second.close = dec!(99999);

        cache.insert_if_absent(key.clone(), first.clone());
        let winner = cache.insert_if_absent(key.clone(), second);
        assert_eq!(winner, first);
        assert_eq!(cache.get(&key), Some(first));
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.json");

        let cache = BarCache::open(&path).unwrap();
        cache.insert_if_absent(sample_key(), sample_bar());
        cache.flush().unwrap();

        let reopened = BarCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&sample_key()), Some(sample_bar()));
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BarCache::open(dir.path().join("absent.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            BarCache::open(&path),
            Err(MarketDataError::CacheStore(_))
        ));
    }
}
