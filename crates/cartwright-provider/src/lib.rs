//! LLM provider abstraction.
//!
//! Providers implement the [`LlmProvider`] trait to turn a completion
//! request (messages + tool schemas) into either free text or tool calls.
//! Errors are classified so the reliability gateway can decide what is
//! worth retrying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use cartwright_core::types::{Message, Role, ToolCall};

pub mod openai;

pub use openai::OpenAiProvider;

/// Credentials for authenticating with an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
    #[serde(rename = "token")]
    Token { token: String },
}

impl Credentials {
    pub fn secret(&self) -> &str {
        match self {
            Credentials::ApiKey { api_key } => api_key,
            Credentials::Token { token } => token,
        }
    }
}

/// A tool exposed to the model: name, description, JSON parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<serde_json::Value>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub tools: Option<Vec<serde_json::Value>>,
    pub system: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The model's answer: free text, tool calls, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: Option<String>,
}

/// Classified provider failure. `is_transient` drives the gateway's retry
/// policy: 429, 5xx, and timeouts retry; auth and malformed requests do not.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider quota exceeded")]
    QuotaExceeded,

    #[error("provider request timed out")]
    Timeout,

    #[error("provider server error (status {0})")]
    Server(u16),

    #[error("provider authentication failed")]
    Auth,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited
                | ProviderError::Timeout
                | ProviderError::Server(_)
                | ProviderError::Transport(_)
        )
    }
}

/// The core LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "openai").
    fn id(&self) -> &str;

    /// Execute one completion call.
    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Render tool definitions into this provider's wire schema.
    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value>;

    /// Render conversation messages into this provider's wire schema.
    fn format_messages(&self, messages: &[Message]) -> Vec<serde_json::Value>;

    /// Whether a stop reason indicates the model wants tools executed.
    fn is_tool_use_stop(&self, stop_reason: &str) -> bool;
}

/// Shared chat-style message formatting: user/agent/system roles to the
/// conventional user/assistant/system wire roles, content as plain text.
pub(crate) fn chat_format_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Agent => "assistant",
                Role::System => "system",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect()
}
