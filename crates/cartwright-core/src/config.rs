//! Configuration loading and defaulting.
//!
//! Every tunable the engine reads (retry counts, breaker thresholds, history
//! window, tool-call cap) lives here as a config default rather than a
//! hard-coded constant.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CartwrightError, Result};

/// Top-level Cartwright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// How many recent messages go into the prompt. Older history is
    /// truncated, not summarized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_calls_per_turn: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_chars: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,
}

/// Configuration for the LLM provider identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key: the `api_key` field wins, then `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        if let Some(env) = &self.api_key_env {
            if let Ok(value) = std::env::var(env) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        None
    }
}

/// Reliability gateway tunables: rate limit, retry, breaker, timeout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_capacity: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_refill_per_sec: Option<f64>,

    /// Calls over the limit queue up to this many waiters, then fail fast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_max_waiters: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_max_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_base_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_cap_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_window: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_min_samples: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_error_threshold: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_cooldown_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
}

impl GatewayConfig {
    pub fn rate_limit_capacity(&self) -> u32 {
        self.rate_limit_capacity.unwrap_or(10)
    }

    pub fn rate_limit_refill_per_sec(&self) -> f64 {
        self.rate_limit_refill_per_sec.unwrap_or(2.0)
    }

    pub fn rate_limit_max_waiters(&self) -> u32 {
        self.rate_limit_max_waiters.unwrap_or(32)
    }

    pub fn retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts.unwrap_or(3)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms.unwrap_or(200))
    }

    pub fn retry_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_cap_ms.unwrap_or(5_000))
    }

    pub fn breaker_window(&self) -> usize {
        self.breaker_window.unwrap_or(10)
    }

    pub fn breaker_min_samples(&self) -> usize {
        self.breaker_min_samples.unwrap_or(5)
    }

    pub fn breaker_error_threshold(&self) -> f64 {
        self.breaker_error_threshold.unwrap_or(0.5)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs.unwrap_or(30))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.unwrap_or(60))
    }
}

impl Config {
    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CartwrightError::Config(format!("read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| CartwrightError::Config(format!("parse {}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn default_model(&self) -> String {
        self.agent
            .as_ref()
            .and_then(|a| a.model.clone())
            .or_else(|| {
                self.provider
                    .as_ref()
                    .and_then(|p| p.default_model.clone())
            })
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_tokens)
            .unwrap_or(1024)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.agent
            .as_ref()
            .and_then(|a| a.temperature)
            .or(Some(0.2))
    }

    pub fn history_window(&self) -> usize {
        self.agent
            .as_ref()
            .and_then(|a| a.history_window)
            .unwrap_or(50)
    }

    pub fn max_tool_calls_per_turn(&self) -> usize {
        self.agent
            .as_ref()
            .and_then(|a| a.max_tool_calls_per_turn)
            .unwrap_or(10)
    }

    pub fn max_message_chars(&self) -> usize {
        self.agent
            .as_ref()
            .and_then(|a| a.max_message_chars)
            .unwrap_or(4_000)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(
            self.agent
                .as_ref()
                .and_then(|a| a.tool_timeout_secs)
                .unwrap_or(10),
        )
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.history_window(), 50);
        assert_eq!(config.max_tool_calls_per_turn(), 10);
        assert_eq!(config.max_message_chars(), 4_000);
        assert_eq!(config.max_tokens(), 1024);
        let gw = config.gateway();
        assert_eq!(gw.retry_max_attempts(), 3);
        assert_eq!(gw.breaker_window(), 10);
        assert!((gw.breaker_error_threshold() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overrides_parse() {
        let json = r#"{
            "agent": { "model": "gpt-4o", "history_window": 20, "max_tool_calls_per_turn": 4 },
            "gateway": { "retry_max_attempts": 5, "breaker_cooldown_secs": 10 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.default_model(), "gpt-4o");
        assert_eq!(config.history_window(), 20);
        assert_eq!(config.max_tool_calls_per_turn(), 4);
        assert_eq!(config.gateway().retry_max_attempts(), 5);
        assert_eq!(config.gateway().breaker_cooldown(), Duration::from_secs(10));
    }

    #[test]
    fn test_resolve_api_key_prefers_literal() {
        let provider = ProviderConfig {
            api_key: Some("sk-literal".into()),
            api_key_env: Some("CARTWRIGHT_TEST_KEY_UNSET".into()),
            ..Default::default()
        };
        assert_eq!(provider.resolve_api_key().as_deref(), Some("sk-literal"));
    }
}
