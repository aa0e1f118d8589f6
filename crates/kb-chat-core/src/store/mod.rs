//! Conversation storage abstraction.
//!
//! The [`ConversationStore`] trait defines every persistence operation the
//! chat service and the HTTP routes need, enabling pluggable backends
//! (SQLite in production, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Conversation, Message, Role};

/// Abstract storage backend for conversations and their messages.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_conversation`](ConversationStore::create_conversation) | Insert a new conversation |
/// | [`get_conversation`](ConversationStore::get_conversation) | Fetch one conversation |
/// | [`list_conversations`](ConversationStore::list_conversations) | All conversations, most recently updated first |
/// | [`delete_conversation`](ConversationStore::delete_conversation) | Delete a conversation and its messages |
/// | [`set_title`](ConversationStore::set_title) | Replace a conversation's title |
/// | [`touch_conversation`](ConversationStore::touch_conversation) | Advance `updated_at` |
/// | [`append_message`](ConversationStore::append_message) | Append a message |
/// | [`list_messages`](ConversationStore::list_messages) | Messages in creation order |
/// | [`count_messages`](ConversationStore::count_messages) | Number of messages in a conversation |
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation with the given title.
    async fn create_conversation(&self, title: &str) -> Result<Conversation>;

    /// Retrieve a conversation by ID.
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// List all conversations ordered by `updated_at` descending.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Delete a conversation and all of its messages.
    ///
    /// Returns `false` if no conversation had that ID.
    async fn delete_conversation(&self, id: &str) -> Result<bool>;

    /// Replace the title of a conversation.
    async fn set_title(&self, id: &str, title: &str) -> Result<()>;

    /// Set `updated_at` of a conversation.
    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Append a message to an existing conversation.
    ///
    /// # Errors
    ///
    /// Fails if the conversation does not exist or `role` is
    /// [`Role::System`].
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message>;

    /// List the messages of a conversation ordered by creation time.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Count the messages of a conversation.
    async fn count_messages(&self, conversation_id: &str) -> Result<usize>;
}

/// Reject roles that may not be persisted.
pub fn ensure_storable(role: Role) -> Result<()> {
    match role {
        Role::User | Role::Assistant => Ok(()),
        Role::System => anyhow::bail!("system messages are not stored"),
    }
}
