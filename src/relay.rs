//! Chat-turn orchestration and the stream relay.
//!
//! A chat request moves through these phases:
//!
//! ```text
//! Idle ──▶ Receiving ──▶ Streaming ──▶ Finalizing ──▶ Closed
//!              │             │
//!              ▼             ▼
//!        (JSON error)     Failed (SSE error frame)
//! ```
//!
//! - **Receiving**: validate the request, resolve the conversation, persist
//!   the user message (and the title on the first turn), run retrieval, and
//!   build the outgoing prompt. Any failure here is reported as a JSON error
//!   and the upstream model is never called.
//! - **Streaming**: open the upstream stream (still JSON errors if that
//!   fails), then forward each increment as it arrives while folding it into
//!   the full answer.
//! - **Finalizing**: persist the assistant message, advance the
//!   conversation's `updated_at`, emit `[DONE]`.
//!
//! The streaming phases run in a spawned task that owns its accumulator.
//! The client only holds the receiving end of a channel, so a disconnect
//! never stops the upstream read or the final persistence.

use std::sync::Arc;

use futures::TryStreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use kb_chat_core::augment::augment;
use kb_chat_core::index::KnowledgeIndex;
use kb_chat_core::models::{derive_title, ChatMessage, Message, Role, DEFAULT_TITLE};
use kb_chat_core::scorer::{find_best_match, MatchPolicy};
use kb_chat_core::store::ConversationStore;

use crate::llm::{ChatProvider, TokenStream};

/// Message shown to the client when the upstream fails mid-stream.
pub const STREAM_INTERRUPTED: &str = "The model stream was interrupted";

const EVENT_BUFFER: usize = 64;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// How errors and results reach the client, fixed when the handler starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// A single JSON body.
    Json,
    /// `text/event-stream` frames.
    EventStream,
}

impl ResponseMode {
    pub fn for_request(req: &ChatRequest) -> Self {
        if req.stream.unwrap_or(true) {
            ResponseMode::EventStream
        } else {
            ResponseMode::Json
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Receiving,
    Streaming,
    Finalizing,
    Closed,
    Failed,
}

impl RelayPhase {
    fn as_str(&self) -> &'static str {
        match self {
            RelayPhase::Receiving => "receiving",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Finalizing => "finalizing",
            RelayPhase::Closed => "closed",
            RelayPhase::Failed => "failed",
        }
    }
}

/// Errors reported before any output reaches the client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0:#}")]
    Store(anyhow::Error),
    #[error("upstream model request failed: {0:#}")]
    Upstream(anyhow::Error),
}

/// One frame on the client-facing event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Content(String),
    Error(String),
    Done,
}

impl RelayEvent {
    /// The `data:` payload for this event.
    pub fn data(&self) -> String {
        match self {
            RelayEvent::Content(text) => serde_json::json!({ "content": text }).to_string(),
            RelayEvent::Error(message) => serde_json::json!({ "error": message }).to_string(),
            RelayEvent::Done => "[DONE]".to_string(),
        }
    }
}

/// A streaming turn in progress.
pub struct ChatStream {
    pub conversation_id: String,
    pub events: mpsc::Receiver<RelayEvent>,
}

/// A validated, persisted turn ready for the upstream call.
struct PreparedTurn {
    conversation_id: String,
    outgoing: Vec<ChatMessage>,
}

/// Chat service: owns the store, the knowledge index, and the provider.
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    index: Arc<KnowledgeIndex>,
    provider: Arc<dyn ChatProvider>,
    policy: MatchPolicy,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        index: Arc<KnowledgeIndex>,
        provider: Arc<dyn ChatProvider>,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            store,
            index,
            provider,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    /// Run a turn to completion and return the persisted assistant message.
    pub async fn complete(&self, req: &ChatRequest) -> Result<Message, ChatError> {
        let turn = self.prepare(req).await?;
        let content = self
            .provider
            .complete(&turn.outgoing)
            .await
            .map_err(ChatError::Upstream)?;

        finalize(self.store.as_ref(), &turn.conversation_id, &content)
            .await
            .map_err(ChatError::Store)
    }

    /// Start a streaming turn.
    ///
    /// Returns once the upstream has accepted the request; from then on all
    /// output, including failures, arrives as [`RelayEvent`]s.
    pub async fn stream(&self, req: &ChatRequest) -> Result<ChatStream, ChatError> {
        let turn = self.prepare(req).await?;
        let upstream = self
            .provider
            .stream(&turn.outgoing)
            .await
            .map_err(ChatError::Upstream)?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run_relay(
            self.store.clone(),
            turn.conversation_id.clone(),
            upstream,
            tx,
        ));

        Ok(ChatStream {
            conversation_id: turn.conversation_id,
            events: rx,
        })
    }

    async fn prepare(&self, req: &ChatRequest) -> Result<PreparedTurn, ChatError> {
        let question = validate(&req.messages)?;

        let conversation = match &req.conversation_id {
            Some(id) => self
                .store
                .get_conversation(id)
                .await
                .map_err(ChatError::Store)?
                .ok_or_else(|| ChatError::NotFound(format!("conversation not found: {}", id)))?,
            None => self
                .store
                .create_conversation(DEFAULT_TITLE)
                .await
                .map_err(ChatError::Store)?,
        };

        let first_turn = self
            .store
            .count_messages(&conversation.id)
            .await
            .map_err(ChatError::Store)?
            == 0;

        self.store
            .append_message(&conversation.id, Role::User, question)
            .await
            .map_err(ChatError::Store)?;

        if first_turn {
            self.store
                .set_title(&conversation.id, &derive_title(question))
                .await
                .map_err(ChatError::Store)?;
        }

        let matched = find_best_match(&self.index, question, &self.policy);
        match &matched {
            Some(m) => tracing::info!(
                conversation = %conversation.id,
                entry = %m.entry.id,
                score = m.score,
                overlap = m.overlap_count,
                "knowledge entry matched"
            ),
            None => tracing::debug!(conversation = %conversation.id, "no knowledge entry matched"),
        }

        tracing::debug!(
            conversation = %conversation.id,
            phase = RelayPhase::Receiving.as_str(),
            "user message persisted"
        );

        Ok(PreparedTurn {
            conversation_id: conversation.id,
            outgoing: augment(&req.messages, matched.as_ref()),
        })
    }
}

/// Check the request shape and return the final user question.
fn validate(messages: &[ChatMessage]) -> Result<&str, ChatError> {
    let last = messages
        .last()
        .ok_or_else(|| ChatError::BadRequest("messages must not be empty".to_string()))?;
    if last.role != Role::User {
        return Err(ChatError::BadRequest(
            "the last message must come from the user".to_string(),
        ));
    }
    if last.content.trim().is_empty() {
        return Err(ChatError::BadRequest(
            "message content must not be empty".to_string(),
        ));
    }
    Ok(&last.content)
}

/// Persist the assistant answer and advance the conversation.
async fn finalize(
    store: &dyn ConversationStore,
    conversation_id: &str,
    content: &str,
) -> anyhow::Result<Message> {
    let msg = store
        .append_message(conversation_id, Role::Assistant, content)
        .await?;
    store
        .touch_conversation(conversation_id, msg.created_at)
        .await?;
    Ok(msg)
}

/// Forward every upstream increment to `tx` and fold them into the full
/// answer.
///
/// Increments are sent in upstream order, one event each. A closed
/// receiver does not stop the fold.
pub async fn relay(
    upstream: TokenStream,
    tx: &mpsc::Sender<RelayEvent>,
) -> anyhow::Result<String> {
    upstream
        .try_fold(String::new(), |mut answer, delta| async move {
            let _ = tx.send(RelayEvent::Content(delta.clone())).await;
            answer.push_str(&delta);
            Ok::<_, anyhow::Error>(answer)
        })
        .await
}

async fn run_relay(
    store: Arc<dyn ConversationStore>,
    conversation_id: String,
    upstream: TokenStream,
    tx: mpsc::Sender<RelayEvent>,
) {
    tracing::debug!(
        conversation = %conversation_id,
        phase = RelayPhase::Streaming.as_str(),
        "relaying upstream stream"
    );

    match relay(upstream, &tx).await {
        Ok(answer) => {
            tracing::debug!(
                conversation = %conversation_id,
                phase = RelayPhase::Finalizing.as_str(),
                chars = answer.chars().count(),
                "upstream complete"
            );
            if let Err(e) = finalize(store.as_ref(), &conversation_id, &answer).await {
                tracing::error!(
                    conversation = %conversation_id,
                    error = %format!("{:#}", e),
                    "failed to persist assistant message"
                );
            }
            let _ = tx.send(RelayEvent::Done).await;
            tracing::debug!(
                conversation = %conversation_id,
                phase = RelayPhase::Closed.as_str(),
                "stream closed"
            );
        }
        Err(e) => {
            tracing::warn!(
                conversation = %conversation_id,
                phase = RelayPhase::Failed.as_str(),
                error = %format!("{:#}", e),
                "upstream stream failed"
            );
            let _ = tx.send(RelayEvent::Error(STREAM_INTERRUPTED.to_string())).await;
        }
    }
}
