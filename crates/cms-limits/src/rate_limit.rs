//! Fixed-window request counting.
//!
//! One counter per identifier (client address, optionally suffixed with the
//! user id). A window opens lazily on the first request after the previous
//! window's reset time. The store is bounded: a sweep drops windows whose reset
//! time has passed and, if the store is still above its hard cap, evicts the
//! oldest 10% by reset time. The cap is also enforced on insert so memory stays
//! bounded between periodic sweeps even under adversarial key cardinality.
//!
//! This runs before token verification on every request so signature checks
//! cannot be used to burn CPU.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::sweeper::Sweep;

/// Per-route limit applied to one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

/// Store bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Hard cap on tracked identifiers.
    pub max_entries: usize,
    /// How often the background sweep runs.
    pub sweep_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Counter state for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_at: Instant,
}

/// Outcome of [`RateLimiter::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// The window's request budget.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the current window closes.
    pub reset_at: Instant,
    /// Time left in the current window, measured at decision time.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// How long a rejected caller should wait, `None` when allowed.
    pub fn retry_after(&self) -> Option<Duration> {
        (!self.allowed).then_some(self.reset_after)
    }
}

/// Limiter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub tracked: usize,
    pub rejected: u64,
    pub evicted: u64,
}

/// Bounded-memory fixed-window rate limiter.
///
/// ```
/// use cms_limits::{RateLimit, RateLimiter, RateLimiterConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::new(RateLimiterConfig::default());
/// let limit = RateLimit::per_minute(2);
///
/// assert!(limiter.allow("203.0.113.7", &limit).allowed);
/// assert!(limiter.allow("203.0.113.7", &limit).allowed);
/// assert!(!limiter.allow("203.0.113.7", &limit).allowed);
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    records: Mutex<HashMap<String, RateLimitRecord>>,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config: RateLimiterConfig {
                max_entries: config.max_entries.max(1),
                ..config
            },
            records: Mutex::new(HashMap::new()),
            rejected: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Count one request against `identifier`.
    pub fn allow(&self, identifier: &str, limit: &RateLimit) -> RateLimitDecision {
        let now = Instant::now();
        let mut records = self.records.lock();

        if !records.contains_key(identifier) && records.len() >= self.config.max_entries {
            let evicted = Self::sweep_locked(&mut records, now, self.config.max_entries - 1);
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        }

        let record = records
            .entry(identifier.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                reset_at: now + limit.window,
            });

        if now >= record.reset_at {
            record.count = 0;
            record.reset_at = now + limit.window;
        }

        let allowed = record.count < limit.max_requests;
        if allowed {
            record.count += 1;
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(identifier, limit = limit.max_requests, "Rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            limit: limit.max_requests,
            remaining: limit.max_requests.saturating_sub(record.count),
            reset_at: record.reset_at,
            reset_after: record.reset_at.saturating_duration_since(now),
        }
    }

    /// Current record for an identifier, if tracked.
    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.records.lock().get(identifier).copied()
    }

    /// Drop one identifier's window.
    pub fn reset(&self, identifier: &str) -> bool {
        self.records.lock().remove(identifier).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            tracked: self.len(),
            rejected: self.rejected.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Remove closed windows, then enforce the hard cap.
    fn sweep_locked(
        records: &mut HashMap<String, RateLimitRecord>,
        now: Instant,
        target: usize,
    ) -> usize {
        let before = records.len();
        records.retain(|_, record| record.reset_at > now);

        if records.len() > target {
            let overflow = records.len() - target;
            let tenth = (records.len() / 10).max(1);
            let evict = overflow.max(tenth);

            let mut by_reset: Vec<(Instant, String)> = records
                .iter()
                .map(|(key, record)| (record.reset_at, key.clone()))
                .collect();
            by_reset.sort_unstable();

            for (_, key) in by_reset.into_iter().take(evict) {
                records.remove(&key);
            }
            warn!(evicted = evict, remaining = records.len(), "Rate limit store over capacity");
        }

        before - records.len()
    }
}

impl Sweep for RateLimiter {
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        let removed = Self::sweep_locked(&mut records, now, self.config.max_entries);
        self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}

/// Build the limiter identifier for a request.
///
/// The full textual address is used for both families; IPv6 is never collapsed
/// to a routing prefix. IPv4-mapped IPv6 addresses are canonicalised to IPv4 so
/// dual-stack listeners bucket one client once.
///
/// ```
/// use cms_limits::client_key;
/// use std::net::IpAddr;
///
/// let v6: IpAddr = "2001:db8::1".parse().unwrap();
/// assert_eq!(client_key(v6, None), "2001:db8::1");
///
/// let mapped: IpAddr = "::ffff:203.0.113.7".parse().unwrap();
/// assert_eq!(client_key(mapped, Some("user-1")), "203.0.113.7:user-1");
/// ```
pub fn client_key(ip: IpAddr, user_id: Option<&str>) -> String {
    let ip = ip.to_canonical();
    match user_id.filter(|id| !id.is_empty()) {
        Some(user_id) => format!("{ip}:{user_id}"),
        None => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_entries: usize) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_entries,
            sweep_interval: Duration::from_secs(300),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_after_max_requests() {
        let limiter = limiter(100);
        let limit = RateLimit::new(3, Duration::from_secs(10));

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.allow("client", &limit);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.retry_after(), None);
        }

        let rejected = limiter.allow("client", &limit);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.retry_after(), Some(Duration::from_secs(10)));
        assert_eq!(limiter.stats().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_window_after_reset() {
        let limiter = limiter(100);
        let limit = RateLimit::new(1, Duration::from_millis(500));

        assert!(limiter.allow("client", &limit).allowed);
        assert!(!limiter.allow("client", &limit).allowed);

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(!limiter.allow("client", &limit).allowed);

        tokio::time::advance(Duration::from_millis(1)).await;
        let decision = limiter.allow("client", &limit);
        assert!(decision.allowed);
        assert_eq!(decision.reset_after, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifiers_are_independent() {
        let limiter = limiter(100);
        let limit = RateLimit::new(1, Duration::from_secs(60));

        assert!(limiter.allow("a", &limit).allowed);
        assert!(limiter.allow("b", &limit).allowed);
        assert!(!limiter.allow("a", &limit).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_closed_windows() {
        let limiter = limiter(100);
        limiter.allow("short", &RateLimit::new(5, Duration::from_secs(1)));
        limiter.allow("long", &RateLimit::new(5, Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.sweep(), 1);
        assert!(limiter.record("short").is_none());
        assert!(limiter.record("long").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_at_cap_evicts_oldest_windows() {
        let limiter = limiter(20);

        for i in 0..20 {
            limiter.allow(&format!("k{i}"), &RateLimit::new(5, Duration::from_secs(60)));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(limiter.len(), 20);

        limiter.allow("newcomer", &RateLimit::new(5, Duration::from_secs(60)));

        // oldest 10% (two windows) made room for the newcomer
        assert_eq!(limiter.len(), 19);
        assert!(limiter.record("k0").is_none());
        assert!(limiter.record("k1").is_none());
        assert!(limiter.record("k2").is_some());
        assert!(limiter.record("newcomer").is_some());
        assert_eq!(limiter.stats().evicted, 2);
    }

    #[test]
    fn test_client_key_keeps_full_ipv6() {
        let a: IpAddr = "2001:db8:1:2:3:4:5:6".parse().unwrap();
        let b: IpAddr = "2001:db8:1:2:3:4:5:7".parse().unwrap();
        assert_ne!(client_key(a, None), client_key(b, None));
        assert_eq!(client_key(a, None), "2001:db8:1:2:3:4:5:6");
    }

    #[test]
    fn test_client_key_user_suffix() {
        let ip: IpAddr = "198.51.100.4".parse().unwrap();
        assert_eq!(client_key(ip, Some("u-1")), "198.51.100.4:u-1");
        assert_eq!(client_key(ip, Some("")), "198.51.100.4");
    }
}
