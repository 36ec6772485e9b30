//! OpenAI Chat Completions API provider (non-streaming).
//!
//! Also serves OpenAI-compatible backends (OpenRouter, local gateways) via
//! a configurable base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use cartwright_core::types::{Message, ToolCall};

use crate::{
    chat_format_messages, CompletionRequest, CompletionResponse, Credentials, LlmProvider,
    ProviderError, ToolDefinition, Usage,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    pub base_url: String,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn openai(base_url: Option<&str>) -> Self {
        Self::compatible("openai", base_url.unwrap_or(OPENAI_BASE_URL))
    }

    /// An OpenAI-compatible endpoint under a different identity.
    pub fn compatible(provider_id: &str, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_id: provider_id.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn classify_status(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth,
        429 if body.contains("insufficient_quota") => ProviderError::QuotaExceeded,
        429 => ProviderError::RateLimited,
        400..=499 => ProviderError::MalformedRequest(format!("status {status}: {body}")),
        _ => ProviderError::Server(status),
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        chat_format_messages(messages)
    }

    fn is_tool_use_stop(&self, stop_reason: &str) -> bool {
        stop_reason == "tool_calls"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(request.messages.iter().cloned());

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.clone(),
        };

        debug!(model = %request.model, "OpenAI completion request");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(credentials.secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments =
                    serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
                ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                }
            })
            .collect();

        let usage = completion
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        trace!(
            tool_calls = tool_calls.len(),
            stop_reason = ?choice.finish_reason,
            "OpenAI completion response"
        );

        Ok(CompletionResponse {
            text: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            usage,
            stop_reason: choice.finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tools_function_schema() {
        let provider = OpenAiProvider::openai(None);
        let tools = vec![ToolDefinition {
            name: "search_catalog".into(),
            description: "Search the catalog".into(),
            parameters_schema: json!({"type": "object", "properties": {}}),
        }];
        let wire = provider.format_tools(&tools);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["type"], "function");
        assert_eq!(wire[0]["function"]["name"], "search_catalog");
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(401, ""), ProviderError::Auth));
        assert!(matches!(classify_status(429, ""), ProviderError::RateLimited));
        assert!(matches!(
            classify_status(429, r#"{"error":{"code":"insufficient_quota"}}"#),
            ProviderError::QuotaExceeded
        ));
        assert!(matches!(
            classify_status(422, "bad"),
            ProviderError::MalformedRequest(_)
        ));
        assert!(matches!(classify_status(503, ""), ProviderError::Server(503)));
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "search_catalog",
                            "arguments": "{\"keyword\": \"laptop\", \"max_price\": 1000}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        });
        let completion: ChatCompletion = serde_json::from_value(raw).unwrap();
        let choice = &completion.choices[0];
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "search_catalog");
        let args: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args["keyword"], "laptop");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let provider = OpenAiProvider::compatible("local", "http://localhost:8080/");
        assert_eq!(provider.base_url, "http://localhost:8080");
    }
}
