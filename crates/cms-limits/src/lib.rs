//! # CMS Limits
//!
//! Process-local, bounded-memory stores used on the request hot path:
//!
//! - [`RateLimiter`]: fixed-window request counter with a hard capacity cap
//! - [`TtlCache`]: generic TTL + LRU memoisation cache
//! - [`Sweeper`]: the background task that purges expired state from either
//!
//! Nothing here is a module-level singleton. Callers construct the stores,
//! share them behind `Arc`, and own the sweeper handle that keeps them tidy:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cms_limits::{RateLimiter, RateLimiterConfig, Sweeper};
//!
//! # async fn example() {
//! let config = RateLimiterConfig::default();
//! let limiter = Arc::new(RateLimiter::new(config));
//! let sweeper = Sweeper::spawn("rate-limit", limiter.clone(), config.sweep_interval);
//!
//! // ... serve requests ...
//!
//! sweeper.shutdown().await;
//! # }
//! ```
//!
//! All state is single-process. Running several instances requires an external
//! shared store, which this crate does not provide.

pub mod cache;
pub mod rate_limit;
pub mod sweeper;

pub use cache::{CacheConfig, CacheStats, TtlCache};
pub use rate_limit::{
    client_key, RateLimit, RateLimitDecision, RateLimitRecord, RateLimiter, RateLimiterConfig,
    RateLimiterStats,
};
pub use sweeper::{Sweep, Sweeper};
