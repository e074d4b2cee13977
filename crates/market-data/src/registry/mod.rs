mod fetch_pool;
mod rate_limiter;
#[allow(clippy::module_inception)]
mod registry;

pub use fetch_pool::{FetchPool, DEFAULT_MAX_IN_FLIGHT};
pub use rate_limiter::RateLimiter;
pub use registry::{RetryPolicy, SourceRegistry};
