/// Classification for retry policy.
///
/// Used to determine how the source registry should respond to errors from
/// price sources.
///
/// # Behavior Summary
///
/// | Class | Retry same source? | Try next source? |
/// |-------|--------------------|------------------|
/// | `Never` | No | No |
/// | `WithBackoff` | Yes (exponential backoff) | Yes, after retries exhaust |
/// | `NextSource` | No | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad pair, validation error, or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry the same source with exponential backoff.
    ///
    /// Used for transient errors like rate limiting (429) or timeout.
    /// After a bounded number of attempts the failure degrades to trying
    /// the next source, never to a process-fatal error.
    WithBackoff,

    /// Try the next source without retrying this one.
    ///
    /// Used when this source can't handle the request (e.g., no bar for
    /// the window, pair unsupported) but another source might succeed.
    NextSource,
}
