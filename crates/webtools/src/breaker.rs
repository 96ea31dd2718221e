use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation
    Closed,
    /// Calls are blocked until the open window elapses
    Open,
    /// Single probe allowed to test recovery
    HalfOpen,
}

#[derive(Debug)]
struct BreakerStats {
    state: BreakerState,
    consecutive_failures: u32,
    last_state_change: Instant,
}

/// Consecutive-failure circuit breaker shared by all calls of one
/// `(bot, destination host)` pair.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    stats: RwLock<BreakerStats>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            stats: RwLock::new(BreakerStats {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_state_change: Instant::now(),
            }),
        }
    }

    /// Whether a call may proceed. An open breaker flips to half-open once
    /// the open window has elapsed, admitting a single probe.
    pub async fn should_allow_call(&self) -> bool {
        let mut stats = self.stats.write().await;
        match stats.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if stats.last_state_change.elapsed() > self.open_duration {
                    stats.state = BreakerState::HalfOpen;
                    stats.last_state_change = Instant::now();
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut stats = self.stats.write().await;
        stats.consecutive_failures = 0;
        if stats.state != BreakerState::Closed {
            stats.state = BreakerState::Closed;
            stats.last_state_change = Instant::now();
        }
    }

    pub async fn record_failure(&self) {
        let mut stats = self.stats.write().await;
        stats.consecutive_failures += 1;

        match stats.state {
            BreakerState::Closed if stats.consecutive_failures >= self.failure_threshold => {
                stats.state = BreakerState::Open;
                stats.last_state_change = Instant::now();
            }
            // any failure during the probe reopens immediately
            BreakerState::HalfOpen => {
                stats.state = BreakerState::Open;
                stats.last_state_change = Instant::now();
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.stats.read().await.state
    }
}
