//! Window-counter rate limiting for upstream providers.
//!
//! Each [`RateLimiter`] allows `max_requests` calls per identifier inside a
//! window; the window starts on the first call and resets once it expires.
//! Limiters are shared through a [`RateLimiterRegistry`] owned by the
//! composition root, so adapters built with the same
//! `(provider, max_requests, window)` triple draw from the same counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::{ProviderError, ProviderResult};
use super::models::RateLimitInfo;

pub const DEFAULT_IDENTIFIER: &str = "default";

/// Upper bound on the random delay added after a window reset, so callers
/// queued on the same window don't all retry on the same tick.
const MAX_JITTER_MS: u64 = 25;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }
}

pub struct RateLimiter {
    provider: String,
    max_requests: u32,
    window: Duration,
    /// Cap on the total time `wait_for_slot` will block
    max_wait: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(provider: &str, max_requests: u32, window: Duration, max_wait: Duration) -> Self {
        RateLimiter {
            provider: provider.to_string(),
            max_requests,
            window,
            max_wait,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("[{}] rate limiter mutex was poisoned, recovering", self.provider);
            poisoned.into_inner()
        })
    }

    /// Check-and-increment. Returns `false` when the identifier has used up
    /// its window.
    pub fn is_allowed(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.lock_windows();

        match windows.get_mut(identifier) {
            Some(w) if !w.is_expired(now) => {
                if w.count < self.max_requests {
                    w.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                if self.max_requests == 0 {
                    return false;
                }
                windows.insert(
                    identifier.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    /// Block until a slot is free, sleeping until each window resets.
    ///
    /// Gives up with [`ProviderError::RateLimited`] once the accumulated wait
    /// would exceed `max_wait`.
    pub async fn wait_for_slot(&self, identifier: &str) -> ProviderResult<()> {
        let mut waited = Duration::ZERO;

        loop {
            if self.is_allowed(identifier) {
                return Ok(());
            }

            let until_reset = self
                .reset_time(identifier)
                .map(|reset_at| reset_at.saturating_duration_since(Instant::now()))
                .unwrap_or(self.window);
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
            let sleep_for = until_reset + jitter;

            if waited + sleep_for > self.max_wait {
                warn!(
                    "[{}] giving up on rate-limit slot for '{}' after {:?}",
                    self.provider, identifier, waited
                );
                return Err(ProviderError::RateLimited {
                    provider: self.provider.clone(),
                    waited,
                });
            }

            debug!(
                "[{}] rate limited, waiting {:?} for '{}'",
                self.provider, sleep_for, identifier
            );
            tokio::time::sleep(sleep_for).await;
            waited += sleep_for;
        }
    }

    pub fn remaining_requests(&self, identifier: &str) -> u32 {
        let now = Instant::now();
        match self.lock_windows().get(identifier) {
            Some(w) if !w.is_expired(now) => self.max_requests.saturating_sub(w.count),
            _ => self.max_requests,
        }
    }

    /// When the identifier's current window resets, if one is open.
    pub fn reset_time(&self, identifier: &str) -> Option<Instant> {
        let now = Instant::now();
        self.lock_windows()
            .get(identifier)
            .filter(|w| !w.is_expired(now))
            .map(|w| w.reset_at)
    }

    /// Drop state for one identifier, or for all of them.
    pub fn clear(&self, identifier: Option<&str>) {
        let mut windows = self.lock_windows();
        match identifier {
            Some(id) => {
                windows.remove(id);
            }
            None => windows.clear(),
        }
    }

    pub fn info(&self) -> RateLimitInfo {
        let reset_in_ms = self
            .reset_time(DEFAULT_IDENTIFIER)
            .map(|at| at.saturating_duration_since(Instant::now()).as_millis() as u64);
        RateLimitInfo {
            provider: self.provider.clone(),
            max_requests: self.max_requests,
            window_ms: self.window.as_millis() as u64,
            remaining: self.remaining_requests(DEFAULT_IDENTIFIER),
            reset_in_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateLimitKey {
    provider: String,
    max_requests: u32,
    window: Duration,
}

/// Explicit map of shared limiters, keyed by provider and limits.
pub struct RateLimiterRegistry {
    max_wait: Duration,
    limiters: Mutex<HashMap<RateLimitKey, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(max_wait: Duration) -> Self {
        RateLimiterRegistry {
            max_wait,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Return the limiter for this exact triple, creating it on first use.
    pub fn get_or_create(
        &self,
        provider: &str,
        max_requests: u32,
        window: Duration,
    ) -> Arc<RateLimiter> {
        let key = RateLimitKey {
            provider: provider.to_string(),
            max_requests,
            window,
        };
        let mut limiters = self.limiters.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter registry mutex was poisoned, recovering");
            poisoned.into_inner()
        });
        Arc::clone(limiters.entry(key).or_insert_with(|| {
            debug!(
                "Creating rate limiter for {} ({} per {:?})",
                provider, max_requests, window
            );
            Arc::new(RateLimiter::new(provider, max_requests, window, self.max_wait))
        }))
    }

    pub fn len(&self) -> usize {
        self.limiters.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        RateLimiterRegistry::new(Duration::from_secs(120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(
            "test",
            max,
            Duration::from_millis(window_ms),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_allows_up_to_max_then_denies() {
        let rl = limiter(5, 1_000);
        for _ in 0..5 {
            assert!(rl.is_allowed(DEFAULT_IDENTIFIER));
        }
        assert!(!rl.is_allowed(DEFAULT_IDENTIFIER));
        assert_eq!(rl.remaining_requests(DEFAULT_IDENTIFIER), 0);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let rl = limiter(2, 50);
        assert!(rl.is_allowed("a"));
        assert!(rl.is_allowed("a"));
        assert!(!rl.is_allowed("a"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rl.is_allowed("a"));
        assert_eq!(rl.remaining_requests("a"), 1);
    }

    #[test]
    fn test_identifiers_are_isolated() {
        let rl = limiter(1, 1_000);
        assert!(rl.is_allowed("a"));
        assert!(!rl.is_allowed("a"));
        assert!(rl.is_allowed("b"));
    }

    #[test]
    fn test_introspection_does_not_consume() {
        let rl = limiter(3, 1_000);
        assert_eq!(rl.remaining_requests("x"), 3);
        assert!(rl.reset_time("x").is_none());
        assert!(rl.is_allowed("x"));
        assert_eq!(rl.remaining_requests("x"), 2);
        assert_eq!(rl.remaining_requests("x"), 2);
        assert!(rl.reset_time("x").is_some());
    }

    #[test]
    fn test_clear_one_and_all() {
        let rl = limiter(1, 1_000);
        assert!(rl.is_allowed("a"));
        assert!(rl.is_allowed("b"));
        rl.clear(Some("a"));
        assert!(rl.is_allowed("a"));
        assert!(!rl.is_allowed("b"));
        rl.clear(None);
        assert!(rl.is_allowed("b"));
    }

    #[tokio::test]
    async fn test_wait_for_slot_blocks_until_reset() {
        let rl = limiter(5, 200);
        for _ in 0..5 {
            assert!(rl.is_allowed(DEFAULT_IDENTIFIER));
        }
        let start = Instant::now();
        rl.wait_for_slot(DEFAULT_IDENTIFIER).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_wait_for_slot_gives_up_past_cap() {
        let rl = RateLimiter::new(
            "capped",
            1,
            Duration::from_secs(10),
            Duration::from_millis(100),
        );
        assert!(rl.is_allowed(DEFAULT_IDENTIFIER));
        let err = rl.wait_for_slot(DEFAULT_IDENTIFIER).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { ref provider, .. } if provider == "capped"));
    }

    #[test]
    fn test_info_snapshot() {
        let rl = limiter(4, 60_000);
        rl.is_allowed(DEFAULT_IDENTIFIER);
        let info = rl.info();
        assert_eq!(info.provider, "test");
        assert_eq!(info.max_requests, 4);
        assert_eq!(info.window_ms, 60_000);
        assert_eq!(info.remaining, 3);
        assert!(info.reset_in_ms.unwrap() <= 60_000);
    }

    #[test]
    fn test_registry_reuses_identical_keys() {
        let registry = RateLimiterRegistry::default();
        let a = registry.get_or_create("API-Football", 30, Duration::from_secs(60));
        let b = registry.get_or_create("API-Football", 30, Duration::from_secs(60));
        let c = registry.get_or_create("API-Football", 10, Duration::from_secs(60));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        assert!(a.is_allowed(DEFAULT_IDENTIFIER));
        assert_eq!(b.remaining_requests(DEFAULT_IDENTIFIER), 29);
    }
}
