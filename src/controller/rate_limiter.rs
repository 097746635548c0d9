//! # Rate Limiter
//!
//! Per-item exponential requeue delays.
//!
//! Every call to [`DefaultRateLimiter::when`] counts as one requeue of the
//! item. The delay starts at the base delay and doubles after each full cycle
//! of 16 requeues, never exceeding the max delay. Callers must
//! [`forget`](DefaultRateLimiter::forget) an item once it reconciles cleanly,
//! otherwise its counters live as long as the limiter.
//!
//! ## Usage
//!
//! ```rust
//! use component_controller::controller::rate_limiter::DefaultRateLimiter;
//! use std::time::Duration;
//!
//! let limiter = DefaultRateLimiter::new(Duration::from_millis(1), Duration::from_secs(1));
//! let key = "shop/webstore".to_string();
//! for _ in 0..16 {
//!     assert_eq!(limiter.when(&key), Duration::from_millis(1));
//! }
//! assert_eq!(limiter.when(&key), Duration::from_millis(2));
//! limiter.forget(&key);
//! assert_eq!(limiter.num_requeues(&key), 0);
//! ```

use crate::constants;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

/// Number of requeues after which the delay doubles
pub const REQUEUES_PER_DOUBLING: u64 = 16;

#[derive(Debug)]
struct Counters<K> {
    requeues: HashMap<K, u64>,
    modifier: HashMap<K, u32>,
}

/// Exponential per-item rate limiter
///
/// One instance is shared by every worker of a controller; a single mutex
/// guards both counter maps and every critical section is O(1).
#[derive(Debug)]
pub struct DefaultRateLimiter<K> {
    base_delay: Duration,
    max_delay: Duration,
    counters: Mutex<Counters<K>>,
}

impl<K: Hash + Eq + Clone> Default for DefaultRateLimiter<K> {
    fn default() -> Self {
        Self::new(
            Duration::from_micros(constants::DEFAULT_RATE_LIMIT_BASE_DELAY_US),
            Duration::from_secs(constants::DEFAULT_RATE_LIMIT_MAX_DELAY_SECS),
        )
    }
}

impl<K: Hash + Eq + Clone> DefaultRateLimiter<K> {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            counters: Mutex::new(Counters {
                requeues: HashMap::new(),
                modifier: HashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Record a requeue of `item` and return how long to wait before retrying it
    pub fn when(&self, item: &K) -> Duration {
        let exponent = {
            let mut guard = self.lock();
            let counters = &mut *guard;
            let exponent = counters.modifier.get(item).copied().unwrap_or(0);
            let requeues = counters.requeues.entry(item.clone()).or_insert(0);
            *requeues += 1;
            if *requeues % REQUEUES_PER_DOUBLING == 0 {
                *counters.modifier.entry(item.clone()).or_insert(0) += 1;
            }
            exponent
        };

        self.delay_for(exponent)
    }

    /// How many times `item` has been requeued since it was last forgotten
    pub fn num_requeues(&self, item: &K) -> u64 {
        self.lock().requeues.get(item).copied().unwrap_or(0)
    }

    /// Drop all state for `item`
    pub fn forget(&self, item: &K) {
        let mut counters = self.lock();
        counters.requeues.remove(item);
        counters.modifier.remove(item);
    }

    /// Number of items currently tracked
    pub fn tracked_items(&self) -> usize {
        self.lock().requeues.len()
    }

    fn delay_for(&self, exponent: u32) -> Duration {
        // base * 2^exponent in nanoseconds; any overflow clamps to the ceiling
        let scaled = 1u128
            .checked_shl(exponent)
            .and_then(|factor| self.base_delay.as_nanos().checked_mul(factor))
            .and_then(|nanos| u64::try_from(nanos).ok());

        match scaled {
            Some(nanos) => Duration::from_nanos(nanos).min(self.max_delay),
            None => self.max_delay,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters<K>> {
        // A panic while holding the lock leaves the counters consistent
        self.counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
