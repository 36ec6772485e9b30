//! Agent orchestration engine — drives one conversational turn: build
//! context, call the model through the reliability gateway, execute tool
//! calls, and persist the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use cartwright_core::types::Message;

pub mod prompt;
pub mod turn;

pub use turn::TurnEngine;

/// The engine's public inbound surface: one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    /// Whether the caller carries a verified identity. Mutating tools are
    /// refused for unauthenticated callers.
    pub authenticated: bool,
    pub message: String,
    pub conversation_id: Option<Uuid>,
}

/// The newly appended messages for one completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
    pub meta: TurnMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMeta {
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u32,
}

/// Failures that abort a turn before it produces a reply. Tool-level and
/// transient provider failures never surface here; they fold into the reply.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("conversation access denied")]
    Forbidden,

    #[error("unknown conversation {0}")]
    UnknownConversation(Uuid),

    #[error("store failure: {0}")]
    Store(String),
}
