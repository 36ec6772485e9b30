//! Circuit breaker over provider call outcomes.
//!
//! Closed (normal) -> Open (fail fast) when the rolling error rate crosses
//! the threshold -> HalfOpen (single trial) after the cooldown -> Closed on
//! trial success, or back to Open on trial failure.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::metrics;

/// Observable breaker state, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

enum State {
    Closed,
    Open { until: Instant },
    // A probe is in flight; if no result lands by `retry_at` (the probe was
    // cancelled mid-call), the next caller is admitted as a fresh probe.
    HalfOpen { retry_at: Instant },
}

struct Inner {
    state: State,
    // Rolling window of recent results; true = success.
    window: VecDeque<bool>,
}

pub struct CircuitBreaker {
    window_size: usize,
    min_samples: usize,
    error_threshold: f64,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        window_size: usize,
        min_samples: usize,
        error_threshold: f64,
        cooldown: Duration,
    ) -> Self {
        Self {
            window_size: window_size.max(1),
            min_samples: min_samples.max(1),
            error_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::new(),
            }),
        }
    }

    /// Whether a call may proceed. In Open state this fails fast until the
    /// cooldown elapses, then admits one trial call (HalfOpen). A trial
    /// whose result never arrives is abandoned after another cooldown and
    /// the next caller becomes the trial.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => true,
            State::Open { until } => {
                let now = Instant::now();
                if now >= until {
                    self.transition(
                        &mut inner,
                        State::HalfOpen {
                            retry_at: now + self.cooldown,
                        },
                    );
                    true
                } else {
                    false
                }
            }
            State::HalfOpen { retry_at } => {
                let now = Instant::now();
                if now >= retry_at {
                    inner.state = State::HalfOpen {
                        retry_at: now + self.cooldown,
                    };
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of an admitted call.
    pub fn record(&self, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::HalfOpen { .. } => {
                if success {
                    inner.window.clear();
                    self.transition(&mut inner, State::Closed);
                } else {
                    let until = Instant::now() + self.cooldown;
                    self.transition(&mut inner, State::Open { until });
                }
            }
            State::Closed => {
                inner.window.push_back(success);
                while inner.window.len() > self.window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() >= self.min_samples {
                    let errors = inner.window.iter().filter(|ok| !**ok).count();
                    let rate = errors as f64 / inner.window.len() as f64;
                    if rate >= self.error_threshold {
                        warn!(
                            errors,
                            samples = inner.window.len(),
                            "Error rate over threshold, opening circuit"
                        );
                        let until = Instant::now() + self.cooldown;
                        self.transition(&mut inner, State::Open { until });
                    }
                }
            }
            // A late result after the breaker already opened; the window is
            // rebuilt from scratch once the breaker closes again.
            State::Open { .. } => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    fn transition(&self, inner: &mut Inner, next: State) {
        let from = match inner.state {
            State::Closed => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        };
        let to = match next {
            State::Closed => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        };
        if from != to {
            info!(from = from.as_str(), to = to.as_str(), "Circuit breaker transition");
            metrics::record_breaker_transition(from.as_str(), to.as_str());
        }
        inner.state = next;
    }
}
