//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST`   | `/chat` | Chat turn; SSE by default, JSON with `"stream": false` |
//! | `GET`    | `/conversations` | List conversations, most recently updated first |
//! | `POST`   | `/conversations` | Create a conversation (`{"title"?}`) |
//! | `GET`    | `/conversations/{id}` | Fetch one conversation |
//! | `DELETE` | `/conversations/{id}` | Delete a conversation and its messages |
//! | `GET`    | `/conversations/{id}/messages` | Messages in creation order |
//! | `GET`    | `/health` | Health check (version, knowledge entry count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "messages must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream_error` (502),
//! `internal` (500). Once an event stream has started, failures arrive as a
//! final `data: {"error": "..."}` frame instead.
//!
//! # Event Stream
//!
//! ```text
//! data: {"content":"Hel"}
//!
//! data: {"content":"lo"}
//!
//! data: [DONE]
//! ```
//!
//! The conversation id is returned in the `x-conversation-id` header for
//! both response modes.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use kb_chat_core::models::{Conversation, Message, Role, DEFAULT_TITLE};
use kb_chat_core::store::ConversationStore;

use crate::config::Config;
use crate::llm::create_provider;
use crate::relay::{ChatError, ChatRequest, ChatService, ChatStream, ResponseMode};
use crate::sqlite_store::SqliteStore;

/// Response header carrying the conversation id of a chat turn.
pub const CONVERSATION_HEADER: &str = "x-conversation-id";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat: Arc::new(chat),
        }
    }

    fn store(&self) -> &dyn ConversationStore {
        self.chat.store().as_ref()
    }
}

/// Starts the HTTP server.
///
/// Loads the knowledge dataset, opens the database (applying the schema),
/// builds the LLM provider, then binds `[server].bind` and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = Arc::new(crate::knowledge::load_index(config));
    let pool = crate::db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    let store: Arc<dyn ConversationStore> = Arc::new(SqliteStore::new(pool));

    let provider = create_provider(&config.llm)?;
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "llm provider ready"
    );

    let chat = ChatService::new(store, index, provider, config.retrieval.policy());
    let app = router(AppState::new(chat), config.server.static_dir.as_deref());

    let listener = TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("kb-chat listening on http://{}", config.server.bind);

    serve(listener, app).await
}

/// Serve `app` on an already-bound listener.
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router.
///
/// When `static_dir` is given, unknown paths are served from it, falling
/// back to its `index.html`.
pub fn router(state: AppState, static_dir: Option<&std::path::Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/chat", post(handle_chat))
        .route(
            "/conversations",
            get(handle_list_conversations).post(handle_create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(handle_get_conversation).delete(handle_delete_conversation),
        )
        .route("/conversations/{id}/messages", get(handle_list_messages))
        .route("/health", get(handle_health))
        .with_state(state);

    if let Some(dir) = static_dir {
        let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(spa);
    }

    app.layer(cors).layer(TraceLayer::new_for_http())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Upstream model failures; the detail stays in the log.
fn upstream_error(err: &anyhow::Error) -> AppError {
    tracing::warn!(error = %format!("{:#}", err), "upstream model request failed");
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error",
        message: "The language model is unavailable".to_string(),
    }
}

fn internal(err: &anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "Internal server error".to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::BadRequest(msg) => bad_request(msg),
            ChatError::NotFound(msg) => not_found(msg),
            ChatError::Store(e) => internal(&e),
            ChatError::Upstream(e) => upstream_error(&e),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(&err)
    }
}

// ============ POST /chat ============

/// JSON response body for a non-streaming chat turn.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    role: Role,
    content: String,
    conversation_id: String,
}

/// Decode a JSON request body, reporting failures in the error contract.
fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid request body: {}", e)))
}

async fn handle_chat(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: ChatRequest = parse_body(&body)?;
    match ResponseMode::for_request(&req) {
        ResponseMode::Json => {
            let msg = state.chat.complete(&req).await?;
            let id = msg.conversation_id.clone();
            let reply = ChatReply {
                role: msg.role,
                content: msg.content,
                conversation_id: msg.conversation_id,
            };
            Ok(([(CONVERSATION_HEADER, id)], Json(reply)).into_response())
        }
        ResponseMode::EventStream => {
            let chat = state.chat.stream(&req).await?;
            Ok(event_stream(chat))
        }
    }
}

fn event_stream(chat: ChatStream) -> Response {
    let ChatStream {
        conversation_id,
        events,
    } = chat;
    let frames = ReceiverStream::new(events)
        .map(|ev| Ok::<_, Infallible>(Event::default().data(ev.data())));

    (
        [(CONVERSATION_HEADER, conversation_id)],
        Sse::new(frames).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

// ============ /conversations ============

#[derive(Deserialize, Default)]
struct CreateConversation {
    #[serde(default)]
    title: Option<String>,
}

async fn handle_list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    Ok(Json(state.store().list_conversations().await?))
}

/// `POST /conversations` accepts an empty body or `{"title": "..."}`.
async fn handle_create_conversation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Conversation>), AppError> {
    let req: CreateConversation = if body.iter().all(u8::is_ascii_whitespace) {
        CreateConversation::default()
    } else {
        parse_body(&body)?
    };

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE);

    let conv = state.store().create_conversation(title).await?;
    Ok((StatusCode::CREATED, Json(conv)))
}

async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, AppError> {
    state
        .store()
        .get_conversation(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("conversation not found: {}", id)))
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store().delete_conversation(&id).await? {
        tracing::info!(conversation = %id, "conversation deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("conversation not found: {}", id)))
    }
}

async fn handle_list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    if state.store().get_conversation(&id).await?.is_none() {
        return Err(not_found(format!("conversation not found: {}", id)));
    }
    Ok(Json(state.store().list_messages(&id).await?))
}

// ============ GET /health ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    knowledge_entries: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        knowledge_entries: state.chat.index().len(),
    })
}
