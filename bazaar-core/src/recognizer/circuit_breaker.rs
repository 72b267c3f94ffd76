//! Circuit breaker guarding the online recognizer: opens after repeated
//! consecutive failures and stays open for a cooldown window.

use std::time::{Duration, Instant};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    consecutive_failures: u32,
    state: State,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            consecutive_failures: 0,
            state: State::Closed,
            opened_at: None,
        }
    }

    /// Whether the online backend should currently be skipped.
    pub fn is_open(&mut self, now: Instant) -> bool {
        if let State::Open = self.state {
            if let Some(opened_at) = self.opened_at {
                if now.duration_since(opened_at) >= self.open_duration {
                    self.state = State::Closed;
                    self.consecutive_failures = 0;
                    self.opened_at = None;
                    return false;
                }
            }
            return true;
        }
        false
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = State::Closed;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.state = State::Open;
            self.opened_at = Some(now);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_DURATION)
    }
}
