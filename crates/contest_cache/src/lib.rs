//! Server-side contest cache and request admission.
//!
//! `ServerCache` serves fresh data from memory, coalesces concurrent
//! refreshes into one upstream fetch, and falls back to stale data when
//! the upstream is failing. `RateLimiter` bounds per-client request rates.

pub mod cache;
pub mod rate_limit;
pub mod source;

pub use cache::{CacheEntry, CacheOutcome, CachePolicy, ServerCache};
pub use rate_limit::{RateLimitConfig, RateLimited, RateLimiter};
pub use source::{ContestSource, UpstreamSource};
