//! Turn orchestrator — the state machine that drives one user turn.
//!
//! Pipeline: validate -> resolve conversation -> build context -> model call
//! through the reliability gateway -> execute tool calls sequentially ->
//! optional follow-up completion for mutating tools -> persist.
//!
//! Tool failures and provider outages fold into a user-safe reply and the
//! turn still persists; only input validation and authorization abort it.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use cartwright_core::config::Config;
use cartwright_core::store::ConversationStore;
use cartwright_core::types::{
    AgentAction, Conversation, Message, MessageMetadata, Role, ToolCall, ToolFailureKind,
    ToolOutcome,
};
use cartwright_core::CartwrightError;
use cartwright_gateway::{GatewayError, ReliabilityGateway};
use cartwright_provider::{CompletionRequest, Credentials, ToolDefinition, Usage};
use cartwright_tools::{CommerceServices, ToolExecutor, ToolKind, ToolRegistry, ToolUser};

use crate::{prompt, TurnError, TurnMeta, TurnRequest, TurnResponse};

const PROVIDER_UNAVAILABLE_REPLY: &str =
    "I'm having trouble reaching the assistant service right now. Please try again in a moment.";

pub struct TurnEngine {
    store: Arc<dyn ConversationStore>,
    gateway: Arc<ReliabilityGateway>,
    services: Arc<dyn CommerceServices>,
    executor: ToolExecutor,
    registry: ToolRegistry,
    credentials: Credentials,
    config: Arc<Config>,
}

impl TurnEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        gateway: Arc<ReliabilityGateway>,
        services: Arc<dyn CommerceServices>,
        credentials: Credentials,
        config: Arc<Config>,
    ) -> Self {
        let executor = ToolExecutor::new(services.clone(), config.tool_timeout());
        Self {
            store,
            gateway,
            services,
            executor,
            registry: ToolRegistry::builtin(),
            credentials,
            config,
        }
    }

    /// Run one complete turn.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let start = Instant::now();

        // 1. Validate before any I/O.
        let text = request.message.trim();
        if text.is_empty() {
            return Err(TurnError::InvalidMessage("message is empty".into()));
        }
        let max_chars = self.config.max_message_chars();
        if request.message.chars().count() > max_chars {
            return Err(TurnError::InvalidMessage(format!(
                "message exceeds {max_chars} characters"
            )));
        }

        // 2. Resolve the conversation (ownership enforced by the store).
        let conversation = match request.conversation_id {
            Some(id) => self
                .store
                .load(id, &request.user_id)
                .await
                .map_err(map_store_error)?
                .ok_or(TurnError::UnknownConversation(id))?,
            None => self
                .store
                .create(&request.user_id)
                .await
                .map_err(map_store_error)?,
        };
        debug!(conversation = %conversation.id, "Turn started");

        // 3. Advisory cart snapshot. Failures degrade to an empty snapshot;
        //    the domain call during tool execution reflects the true state.
        let cart_context = if request.authenticated {
            match self.services.get_cart(&request.user_id).await {
                Ok(cart) => cart.to_context(),
                Err(e) => {
                    warn!(error = %e, "Cart snapshot unavailable, continuing without it");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut user_message = Message::new(Role::User, text);
        if !cart_context.is_empty() {
            user_message.metadata = Some(MessageMetadata::CartContext {
                entries: cart_context,
            });
        }

        // 4. Build the prompt and call the model.
        let system_prompt = prompt::build_system_prompt(&self.registry);
        let prompt_messages = prompt::build_messages(
            &conversation,
            self.config.history_window(),
            &user_message,
        );
        let provider = self.gateway.provider();
        let tool_definitions: Vec<ToolDefinition> = self
            .registry
            .specs()
            .iter()
            .map(|spec| ToolDefinition {
                name: spec.name.to_string(),
                description: spec.description.to_string(),
                parameters_schema: spec.parameters_schema(),
            })
            .collect();

        let completion_request = CompletionRequest {
            model: self.config.default_model(),
            messages: provider.format_messages(&prompt_messages),
            max_tokens: self.config.max_tokens(),
            temperature: self.config.temperature(),
            tools: Some(provider.format_tools(&tool_definitions)),
            system: Some(system_prompt.clone()),
        };

        let mut usage = Usage::default();
        let response = match self.gateway.execute(&completion_request, &self.credentials).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Model call failed, replying with outage notice");
                let reply = Message::new(Role::Agent, PROVIDER_UNAVAILABLE_REPLY)
                    .with_metadata(MessageMetadata::Error {
                        kind: gateway_error_kind(&e).into(),
                    });
                return self
                    .persist(conversation, user_message, vec![reply], Vec::new(), start, usage, 0)
                    .await;
            }
        };
        add_usage(&mut usage, response.usage);

        // No tool calls: the model's text is the reply.
        if response.tool_calls.is_empty() {
            let content = response
                .text
                .unwrap_or_else(|| "I'm not sure how to help with that.".to_string());
            let reply = Message::new(Role::Agent, content);
            return self
                .persist(conversation, user_message, vec![reply], Vec::new(), start, usage, 0)
                .await;
        }

        // 5. Execute tool calls sequentially, in model order, capped.
        let cap = self.config.max_tool_calls_per_turn();
        let user = ToolUser {
            id: request.user_id.clone(),
            authenticated: request.authenticated,
        };
        let mut actions: Vec<AgentAction> = Vec::new();
        let mut executed: Vec<(ToolCall, ToolOutcome)> = Vec::new();
        let mut tool_call_count: u32 = 0;

        for (index, call) in response.tool_calls.iter().enumerate() {
            let outcome = if index >= cap {
                warn!(tool = %call.name, cap, "Tool call over per-turn cap, rejecting");
                ToolOutcome::failure(
                    ToolFailureKind::LimitExceeded,
                    format!("tool call limit of {cap} per turn reached"),
                )
            } else {
                tool_call_count += 1;
                self.executor.execute(&self.registry, call, &user).await
            };
            actions.push(AgentAction::new(
                call.name.clone(),
                call.arguments.clone(),
                outcome.clone(),
            ));
            executed.push((call.clone(), outcome));
        }
        info!(
            tools = tool_call_count,
            rejected = executed.len() - tool_call_count as usize,
            "Tool execution finished"
        );

        // 6. Fold outcomes into the reply.
        let metadata = self.reply_metadata(&executed);
        let attempted_mutation = executed
            .iter()
            .take(cap)
            .any(|(call, _)| self.is_mutating(&call.name));

        let content = if attempted_mutation {
            self.follow_up_reply(&prompt_messages, &response.text, &executed, &system_prompt, &mut usage)
                .await
        } else {
            response
                .text
                .clone()
                .unwrap_or_else(|| render_outcomes(&executed))
        };

        let mut reply = Message::new(Role::Agent, content);
        reply.metadata = metadata;

        self.persist(
            conversation,
            user_message,
            vec![reply],
            actions,
            start,
            usage,
            tool_call_count,
        )
        .await
    }

    fn is_mutating(&self, tool_name: &str) -> bool {
        self.registry
            .get(tool_name)
            .is_some_and(|spec| spec.kind == ToolKind::Mutating)
    }

    /// Second completion that turns raw tool outcomes into a conversational
    /// confirmation. Falls back to a rendered summary when the model is
    /// unreachable.
    async fn follow_up_reply(
        &self,
        prompt_messages: &[Message],
        first_text: &Option<String>,
        executed: &[(ToolCall, ToolOutcome)],
        system_prompt: &str,
        usage: &mut Usage,
    ) -> String {
        let provider = self.gateway.provider();
        let mut messages = prompt_messages.to_vec();
        if let Some(text) = first_text {
            messages.push(Message::new(Role::Agent, text.clone()));
        }
        messages.push(Message::new(
            Role::System,
            format!(
                "Actions performed this turn:\n{}\nWrite a short, friendly reply confirming what \
                 happened. Mention any failures plainly, without technical detail.",
                render_outcomes(executed)
            ),
        ));

        let request = CompletionRequest {
            model: self.config.default_model(),
            messages: provider.format_messages(&messages),
            max_tokens: self.config.max_tokens(),
            temperature: self.config.temperature(),
            tools: None,
            system: Some(system_prompt.to_string()),
        };

        match self.gateway.execute(&request, &self.credentials).await {
            Ok(response) => {
                add_usage(usage, response.usage);
                response.text.unwrap_or_else(|| render_outcomes(executed))
            }
            Err(e) => {
                warn!(error = %e, "Follow-up completion failed, using rendered summary");
                render_outcomes(executed)
            }
        }
    }

    /// Structured rendering payload for the client, taken from the last
    /// successful tool outcome that carries a renderable shape.
    fn reply_metadata(&self, executed: &[(ToolCall, ToolOutcome)]) -> Option<MessageMetadata> {
        let mut metadata = None;
        for (_, outcome) in executed {
            let ToolOutcome::Success { payload } = outcome else {
                continue;
            };
            if let Some(items) = payload.get("items") {
                metadata = Some(MessageMetadata::Items {
                    items: items.clone(),
                });
            } else if let Some(cart) = payload.get("cart") {
                metadata = Some(MessageMetadata::Cart { cart: cart.clone() });
            } else if let Some(analytics) = payload.get("analytics") {
                metadata = Some(MessageMetadata::Analytics {
                    analytics: analytics.clone(),
                });
            } else if let Some(purchase_request) = payload.get("purchase_request") {
                metadata = Some(MessageMetadata::PurchaseRequest {
                    purchase_request: purchase_request.clone(),
                });
            }
        }
        if metadata.is_none() {
            if let Some((_, ToolOutcome::Failure { kind, .. })) =
                executed.iter().find(|(_, o)| o.is_failure())
            {
                metadata = Some(MessageMetadata::Error {
                    kind: kind.as_str().into(),
                });
            }
        }
        metadata
    }

    /// Persist the turn (user message, agent replies, action log) and build
    /// the response. Both success and recovered-error turns end here, so the
    /// conversation always stays appendable.
    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        conversation: Conversation,
        user_message: Message,
        replies: Vec<Message>,
        actions: Vec<AgentAction>,
        start: Instant,
        usage: Usage,
        tool_call_count: u32,
    ) -> Result<TurnResponse, TurnError> {
        let mut messages = vec![user_message];
        messages.extend(replies);

        self.store
            .append(conversation.id, &messages, &actions)
            .await
            .map_err(map_store_error)?;

        Ok(TurnResponse {
            conversation_id: conversation.id,
            messages,
            meta: TurnMeta {
                duration_ms: start.elapsed().as_millis() as u64,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                tool_calls: tool_call_count,
            },
        })
    }
}

fn add_usage(total: &mut Usage, delta: Usage) {
    total.input_tokens += delta.input_tokens;
    total.output_tokens += delta.output_tokens;
}

fn map_store_error(error: CartwrightError) -> TurnError {
    match error {
        CartwrightError::Forbidden(_) => TurnError::Forbidden,
        other => TurnError::Store(other.to_string()),
    }
}

fn gateway_error_kind(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::Throttled => "throttled",
        GatewayError::CircuitOpen | GatewayError::Provider(_) => "provider_unavailable",
    }
}

/// Plain-text summary of tool outcomes, safe to show to the user.
fn render_outcomes(executed: &[(ToolCall, ToolOutcome)]) -> String {
    let lines: Vec<String> = executed
        .iter()
        .map(|(call, outcome)| match outcome {
            ToolOutcome::Success { .. } => format!("- {}: done", call.name),
            ToolOutcome::Failure { message, .. } => {
                format!("- {}: failed ({message})", call.name)
            }
        })
        .collect();
    format!("Here's what happened:\n{}", lines.join("\n"))
}
