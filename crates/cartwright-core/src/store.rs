//! Conversation store adapter — the engine's narrow read/write contract for
//! durable conversation state.
//!
//! The store owns consistency and ownership checks: loading a conversation
//! that belongs to another user is an error, never a silent cross-user read.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CartwrightError, Result};
use crate::types::{AgentAction, Conversation, Message};

/// Narrow persistence contract consumed by the turn orchestrator.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation by id, verifying the requesting user owns it.
    /// Returns `Ok(None)` when the id is unknown.
    async fn load(&self, id: Uuid, user_id: &str) -> Result<Option<Conversation>>;

    /// Create a fresh conversation owned by `user_id`.
    async fn create(&self, user_id: &str) -> Result<Conversation>;

    /// Durably append messages and action records, in order.
    async fn append(&self, id: Uuid, messages: &[Message], actions: &[AgentAction]) -> Result<()>;
}

/// In-memory store used in tests and single-process deployments.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, id: Uuid, user_id: &str) -> Result<Option<Conversation>> {
        let map = self.conversations.read().await;
        match map.get(&id) {
            Some(conv) if conv.user_id == user_id => Ok(Some(conv.clone())),
            Some(_) => Err(CartwrightError::Forbidden(format!(
                "conversation {id} is not owned by the requesting user"
            ))),
            None => Ok(None),
        }
    }

    async fn create(&self, user_id: &str) -> Result<Conversation> {
        let conv = Conversation::new(user_id);
        self.conversations.write().await.insert(conv.id, conv.clone());
        Ok(conv)
    }

    async fn append(&self, id: Uuid, messages: &[Message], actions: &[AgentAction]) -> Result<()> {
        let mut map = self.conversations.write().await;
        let conv = map
            .get_mut(&id)
            .ok_or_else(|| CartwrightError::Store(format!("unknown conversation {id}")))?;
        for message in messages {
            conv.append_message(message.clone());
        }
        for action in actions {
            conv.append_action(action.clone());
        }
        Ok(())
    }
}

/// One line in a conversation transcript file.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TranscriptRecord {
    Message { message: Message },
    Action { action: AgentAction },
}

/// Index entry for a persisted conversation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ConversationMeta {
    id: Uuid,
    user_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
    last_active_at: chrono::DateTime<chrono::Utc>,
}

/// File-based store using JSONL transcripts.
///
/// Layout:
/// - `<base>/conversations.json` — array of index entries
/// - `<base>/transcripts/<id>.jsonl` — one transcript record per line
pub struct JsonlConversationStore {
    base: PathBuf,
}

impl JsonlConversationStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    fn index_path(&self) -> PathBuf {
        self.base.join("conversations.json")
    }

    fn transcript_dir(&self) -> PathBuf {
        self.base.join("transcripts")
    }

    fn transcript_path(&self, id: Uuid) -> PathBuf {
        self.transcript_dir().join(format!("{id}.jsonl"))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base).await?;
        tokio::fs::create_dir_all(self.transcript_dir()).await?;
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<ConversationMeta>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let metas: Vec<ConversationMeta> = serde_json::from_str(&data)?;
        Ok(metas)
    }

    async fn save_index(&self, metas: &[ConversationMeta]) -> Result<()> {
        self.ensure_dirs().await?;
        let data = serde_json::to_string_pretty(metas)?;
        let path = self.index_path();
        // Atomic write: write to temp then rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_transcript(&self, id: Uuid) -> Result<(Vec<Message>, Vec<AgentAction>)> {
        let path = self.transcript_path(id);
        if !path.exists() {
            return Ok((Vec::new(), Vec::new()));
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut messages = Vec::new();
        let mut actions = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: TranscriptRecord = serde_json::from_str(line)
                .map_err(|e| CartwrightError::Store(format!("corrupt transcript line: {e}")))?;
            match record {
                TranscriptRecord::Message { message } => messages.push(message),
                TranscriptRecord::Action { action } => actions.push(action),
            }
        }
        Ok((messages, actions))
    }
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn load(&self, id: Uuid, user_id: &str) -> Result<Option<Conversation>> {
        let metas = self.load_index().await?;
        let Some(meta) = metas.into_iter().find(|m| m.id == id) else {
            return Ok(None);
        };
        if meta.user_id != user_id {
            return Err(CartwrightError::Forbidden(format!(
                "conversation {id} is not owned by the requesting user"
            )));
        }
        let (messages, actions) = self.load_transcript(id).await?;
        debug!(%id, messages = messages.len(), actions = actions.len(), "Loaded conversation");
        Ok(Some(Conversation {
            id: meta.id,
            user_id: meta.user_id,
            messages,
            actions,
            created_at: meta.created_at,
            last_active_at: meta.last_active_at,
        }))
    }

    async fn create(&self, user_id: &str) -> Result<Conversation> {
        self.ensure_dirs().await?;
        let conv = Conversation::new(user_id);
        let mut metas = self.load_index().await?;
        metas.push(ConversationMeta {
            id: conv.id,
            user_id: conv.user_id.clone(),
            created_at: conv.created_at,
            last_active_at: conv.last_active_at,
        });
        self.save_index(&metas).await?;
        debug!(id = %conv.id, "Created conversation");
        Ok(conv)
    }

    async fn append(&self, id: Uuid, messages: &[Message], actions: &[AgentAction]) -> Result<()> {
        self.ensure_dirs().await?;

        let mut metas = self.load_index().await?;
        let meta = metas
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CartwrightError::Store(format!("unknown conversation {id}")))?;
        meta.last_active_at = chrono::Utc::now();

        let path = self.transcript_path(id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        for message in messages {
            let record = TranscriptRecord::Message {
                message: message.clone(),
            };
            let line = serde_json::to_string(&record)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        for action in actions {
            let record = TranscriptRecord::Action {
                action: action.clone(),
            };
            let line = serde_json::to_string(&record)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;

        self.save_index(&metas).await?;
        debug!(%id, messages = messages.len(), actions = actions.len(), "Appended to conversation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolOutcome};
    use serde_json::json;

    fn user_message(text: &str) -> Message {
        Message::new(Role::User, text)
    }

    #[tokio::test]
    async fn test_memory_create_and_load() {
        let store = MemoryConversationStore::new();
        let conv = store.create("alice").await.unwrap();

        let loaded = store.load(conv.id, "alice").await.unwrap().unwrap();
        assert_eq!(loaded.id, conv.id);
        assert!(loaded.messages.is_empty());
    }

    #[tokio::test]
    async fn test_memory_ownership_enforced() {
        let store = MemoryConversationStore::new();
        let conv = store.create("alice").await.unwrap();

        let result = store.load(conv.id, "mallory").await;
        assert!(matches!(result, Err(CartwrightError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_memory_append_preserves_order() {
        let store = MemoryConversationStore::new();
        let conv = store.create("alice").await.unwrap();

        store
            .append(conv.id, &[user_message("one"), user_message("two")], &[])
            .await
            .unwrap();
        store.append(conv.id, &[user_message("three")], &[]).await.unwrap();

        let loaded = store.load(conv.id, "alice").await.unwrap().unwrap();
        let contents: Vec<_> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_memory_append_unknown_conversation() {
        let store = MemoryConversationStore::new();
        let result = store.append(Uuid::new_v4(), &[user_message("hi")], &[]).await;
        assert!(matches!(result, Err(CartwrightError::Store(_))));
    }

    #[tokio::test]
    async fn test_jsonl_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlConversationStore::new(dir.path().to_path_buf());

        let conv = store.create("alice").await.unwrap();
        let action = AgentAction::new(
            "view_cart",
            json!({}),
            ToolOutcome::Success {
                payload: json!({"items": []}),
            },
        );
        store
            .append(conv.id, &[user_message("show my cart")], &[action])
            .await
            .unwrap();

        let loaded = store.load(conv.id, "alice").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.actions.len(), 1);
        assert_eq!(loaded.actions[0].tool, "view_cart");
    }

    #[tokio::test]
    async fn test_jsonl_ownership_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlConversationStore::new(dir.path().to_path_buf());

        let conv = store.create("alice").await.unwrap();
        let result = store.load(conv.id, "mallory").await;
        assert!(matches!(result, Err(CartwrightError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_jsonl_unknown_id_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlConversationStore::new(dir.path().to_path_buf());
        let loaded = store.load(Uuid::new_v4(), "alice").await.unwrap();
        assert!(loaded.is_none());
    }
}
