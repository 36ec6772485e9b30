//! Reliability gateway — wraps every outbound LLM call with rate limiting,
//! retry with backoff, a circuit breaker, and a per-call timeout.
//!
//! One gateway instance exists per provider identity and is shared by every
//! concurrent turn, so all internal state is thread-safe. The gateway knows
//! nothing about conversation semantics.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use cartwright_core::config::GatewayConfig;
use cartwright_provider::{CompletionRequest, CompletionResponse, Credentials, LlmProvider, ProviderError};

pub mod breaker;
pub mod metrics;
pub mod rate_limit;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use rate_limit::TokenBucket;
pub use retry::RetryPolicy;

/// Failures surfaced by the gateway. Transient provider errors are retried
/// internally; only exhausted retries, throttling, and an open circuit
/// surface here.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("call throttled: rate limit queue is full")]
    Throttled,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct ReliabilityGateway {
    provider: Arc<dyn LlmProvider>,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    call_timeout: std::time::Duration,
}

impl ReliabilityGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &GatewayConfig) -> Self {
        Self {
            provider,
            limiter: TokenBucket::new(
                config.rate_limit_capacity(),
                config.rate_limit_refill_per_sec(),
                config.rate_limit_max_waiters(),
            ),
            breaker: CircuitBreaker::new(
                config.breaker_window(),
                config.breaker_min_samples(),
                config.breaker_error_threshold(),
                config.breaker_cooldown(),
            ),
            policy: RetryPolicy::new(
                config.retry_max_attempts(),
                config.retry_backoff_base(),
                config.retry_backoff_cap(),
            ),
            call_timeout: config.call_timeout(),
        }
    }

    /// The wrapped provider, for message/tool formatting.
    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Execute one completion with the full reliability stack applied.
    pub async fn execute(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<CompletionResponse, GatewayError> {
        // One token per logical call; retries ride on the same token.
        if let Err(e) = self.limiter.acquire().await {
            metrics::record_throttled(self.provider.id());
            return Err(e);
        }

        let mut attempt: u32 = 0;
        loop {
            if !self.breaker.try_acquire() {
                warn!(provider = self.provider.id(), "Circuit open, failing fast");
                return Err(GatewayError::CircuitOpen);
            }

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                self.call_timeout,
                self.provider.complete(request, credentials),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };
            metrics::record_call(
                self.provider.id(),
                started.elapsed().as_secs_f64(),
                outcome.is_ok(),
            );

            match outcome {
                Ok(response) => {
                    self.breaker.record(true);
                    return Ok(response);
                }
                Err(e) => {
                    self.breaker.record(false);
                    attempt += 1;
                    if !e.is_transient() || attempt >= self.policy.max_attempts {
                        warn!(
                            provider = self.provider.id(),
                            attempt,
                            error = %e,
                            "Provider call failed"
                        );
                        return Err(e.into());
                    }
                    let delay = self.policy.delay_for(attempt - 1);
                    debug!(
                        provider = self.provider.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    metrics::record_retry(self.provider.id());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
