//! Metrics counters for gateway observability.

/// Record a completed provider call with its duration.
pub fn record_call(provider: &str, duration_secs: f64, success: bool) {
    let labels = [
        ("provider", provider.to_string()),
        ("outcome", if success { "ok" } else { "error" }.to_string()),
    ];
    metrics::counter!("llm_calls_total", &labels).increment(1);
    metrics::histogram!("llm_call_duration_seconds", &labels).record(duration_secs);
}

/// Record a retry attempt.
pub fn record_retry(provider: &str) {
    let labels = [("provider", provider.to_string())];
    metrics::counter!("llm_retries_total", &labels).increment(1);
}

/// Record a call rejected by the rate limiter queue.
pub fn record_throttled(provider: &str) {
    let labels = [("provider", provider.to_string())];
    metrics::counter!("llm_throttled_total", &labels).increment(1);
}

/// Record a circuit breaker state transition.
pub fn record_breaker_transition(from: &str, to: &str) {
    let labels = [("from", from.to_string()), ("to", to.to_string())];
    metrics::counter!("breaker_transitions_total", &labels).increment(1);
}
