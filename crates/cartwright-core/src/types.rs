//! Conversation model — messages, tool calls, and the agent action log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

/// A single advisory cart entry injected into the prompt so the model can
/// tell "add a new item" apart from "increase an existing quantity".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartContextEntry {
    pub item_id: String,
    pub item_name: String,
    pub quantity: u32,
}

/// Structured payloads attached to messages for client rendering.
///
/// Never fed back to the model except as rendered plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageMetadata {
    #[serde(rename = "items")]
    Items { items: serde_json::Value },

    #[serde(rename = "cart")]
    Cart { cart: serde_json::Value },

    #[serde(rename = "analytics")]
    Analytics { analytics: serde_json::Value },

    #[serde(rename = "purchase_request")]
    PurchaseRequest { purchase_request: serde_json::Value },

    /// Cart snapshot that was current when a user message arrived.
    #[serde(rename = "cart_context")]
    CartContext { entries: Vec<CartContextEntry> },

    #[serde(rename = "error")]
    Error { kind: String },
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A model-issued request to invoke a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Closed set of tool failure classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    UnknownTool,
    InvalidArguments,
    AuthenticationRequired,
    NotFound,
    Validation,
    LimitExceeded,
    Timeout,
    Unknown,
}

impl ToolFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolFailureKind::UnknownTool => "unknown_tool",
            ToolFailureKind::InvalidArguments => "invalid_arguments",
            ToolFailureKind::AuthenticationRequired => "authentication_required",
            ToolFailureKind::NotFound => "not_found",
            ToolFailureKind::Validation => "validation",
            ToolFailureKind::LimitExceeded => "limit_exceeded",
            ToolFailureKind::Timeout => "timeout",
            ToolFailureKind::Unknown => "unknown",
        }
    }
}

/// Result of one tool invocation: a domain payload or a classified failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: serde_json::Value },
    Failure { kind: ToolFailureKind, message: String },
}

impl ToolOutcome {
    pub fn failure(kind: ToolFailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Append-only audit record of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: Uuid,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AgentAction {
    pub fn new(tool: impl Into<String>, arguments: serde_json::Value, outcome: ToolOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: tool.into(),
            arguments,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// A conversation owned by a single user. The message log is append-only;
/// the prompt builder takes a bounded slice over it, never mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub messages: Vec<Message>,
    pub actions: Vec<AgentAction>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            messages: Vec::new(),
            actions: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn append_message(&mut self, message: Message) {
        self.last_active_at = Utc::now();
        self.messages.push(message);
    }

    pub fn append_action(&mut self, action: AgentAction) {
        self.last_active_at = Utc::now();
        self.actions.push(action);
    }

    /// The most recent `window` messages, oldest first.
    pub fn recent_messages(&self, window: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }
}
