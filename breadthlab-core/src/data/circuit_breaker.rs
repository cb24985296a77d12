//! Circuit breaker for provider bans and rate limiting.
//!
//! A breadth run touches every instrument in the universe back to back, so a
//! banned IP would otherwise turn into one slow failure per instrument. Once
//! tripped, the breaker refuses requests until its cooldown expires and the
//! engine records the remaining instruments as provider faults immediately.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open { tripped_at: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: 3,
        }
    }

    /// 30-minute cooldown, trips after 3 consecutive failures.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner holds plain counters; a panic mid-update cannot leave it torn.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.cooldown {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            tracing::warn!(
                failures = inner.consecutive_failures,
                "circuit breaker tripped after consecutive provider failures"
            );
            inner.state = BreakerState::Open {
                tripped_at: Instant::now(),
            };
        }
    }

    /// Trip immediately (HTTP 403 / IP ban).
    pub fn trip(&self) {
        tracing::warn!("circuit breaker tripped: provider refused access");
        self.lock().state = BreakerState::Open {
            tripped_at: Instant::now(),
        };
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match self.lock().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { tripped_at } => self.cooldown.saturating_sub(tripped_at.elapsed()),
        }
    }
}
