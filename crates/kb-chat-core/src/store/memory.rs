//! In-memory [`ConversationStore`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Deleting a conversation drops
//! its messages in the same critical section, mirroring the cascade the
//! SQLite schema enforces.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{now_millis, Conversation, Message, Role};

use super::{ensure_storable, ConversationStore};

#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let now = now_millis();
        let conv = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.write().unwrap().conversations.push(conv.clone());
        Ok(conv)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let tables = self.tables.read().unwrap();
        let mut convs = tables.conversations.clone();
        // newest insert first on equal timestamps, matching rowid DESC in SQLite
        convs.reverse();
        convs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(convs)
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.conversations.len();
        tables.conversations.retain(|c| c.id != id);
        if tables.conversations.len() == before {
            return Ok(false);
        }
        tables.messages.retain(|m| m.conversation_id != id);
        Ok(true)
    }

    async fn set_title(&self, id: &str, title: &str) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        if let Some(c) = tables.conversations.iter_mut().find(|c| c.id == id) {
            c.title = title.to_string();
        }
        Ok(())
    }

    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        if let Some(c) = tables.conversations.iter_mut().find(|c| c.id == id) {
            c.updated_at = at;
        }
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message> {
        ensure_storable(role)?;
        let mut tables = self.tables.write().unwrap();
        if !tables.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(anyhow!("conversation not found: {}", conversation_id));
        }
        let msg = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now_millis(),
        };
        tables.messages.push(msg.clone());
        Ok(msg)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn count_messages(&self, conversation_id: &str) -> Result<usize> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .count())
    }
}
