//! LLM provider abstraction and implementations.
//!
//! Defines the [`ChatProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when `llm.provider = "disabled"`.
//! - **[`OpenAiProvider`]**: any OpenAI-compatible `/chat/completions`
//!   endpoint (OpenAI, Hugging Face router, local servers).
//!
//! # Streaming Contract
//!
//! [`ChatProvider::stream`] resolves once the upstream has accepted the
//! request (status checked, no body read yet). The returned
//! [`TokenStream`] then yields text increments in upstream order and ends
//! after the `[DONE]` sentinel (or end of body). An `Err` item ends the
//! stream. A body that goes silent for longer than `llm.timeout_secs` ends
//! with an `Err` as well.

use anyhow::{bail, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use kb_chat_core::models::ChatMessage;

use crate::config::LlmConfig;

/// Incremental text deltas from an upstream completion.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Returns the provider identifier (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Returns the model identifier sent upstream.
    fn model(&self) -> &str;

    /// Run a completion and return the whole answer.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Open a streaming completion.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}

/// Create the provider selected by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAiProvider`] |
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ChatProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A provider that refuses every request.
pub struct DisabledProvider;

#[async_trait]
impl ChatProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    fn model(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("LLM provider is disabled")
    }

    async fn stream(&self, _messages: &[ChatMessage]) -> Result<TokenStream> {
        bail!("LLM provider is disabled")
    }
}

// ============ OpenAI-compatible Provider ============

/// Provider for OpenAI-compatible chat-completion APIs.
///
/// The bearer token is read once from the environment variable named by
/// `llm.api_key_env`. When it is unset, requests go out without an
/// `Authorization` header, which suits local servers.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "llm api key not set; sending unauthenticated requests"
            );
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            timeout,
        })
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .request(messages, false)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("LLM API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        parse_completion(&json)
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.request(messages, true).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("LLM API error {}: {}", status, body_text);
        }

        tracing::debug!(model = %self.model, "upstream stream opened");
        Ok(delta_stream(response.bytes_stream(), self.timeout))
    }
}

/// Extract `choices[0].message.content` from a non-streaming response.
fn parse_completion(json: &Value) -> Result<String> {
    if let Some(err) = json.get("error") {
        bail!("LLM API error: {}", err);
    }
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid LLM response: missing choices[0].message.content"))
}

// ============ SSE decoding ============

/// One decoded upstream event.
#[derive(Debug, PartialEq)]
enum Frame {
    Delta(String),
    Done,
}

/// Incremental decoder for `text/event-stream` chat-completion bodies.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = decode_line(&String::from_utf8_lossy(&line))? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Decode a trailing line that was not newline-terminated.
    fn finish(&mut self) -> Result<Vec<Frame>> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(decode_line(&String::from_utf8_lossy(&rest))?
            .into_iter()
            .collect())
    }
}

fn decode_line(line: &str) -> Result<Option<Frame>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, comments, and event/id fields
        return Ok(None);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(Some(Frame::Done));
    }

    let json: Value = serde_json::from_str(data)
        .map_err(|e| anyhow::anyhow!("Invalid LLM stream chunk: {}", e))?;
    if let Some(err) = json.get("error") {
        bail!("LLM stream error: {}", err);
    }

    match json
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.is_empty() => Ok(Some(Frame::Delta(text.to_string()))),
        _ => Ok(None),
    }
}

/// Turn an upstream SSE byte stream into a stream of text increments.
///
/// Waiting longer than `idle` for the next chunk fails the stream.
pub fn delta_stream<S, B, E>(bytes: S, idle: Duration) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    Box::pin(decode_deltas(bytes, idle))
}

fn decode_deltas<S, B, E>(
    bytes: S,
    idle: Duration,
) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    try_stream! {
        let mut decoder = SseDecoder::default();
        let mut bytes = Box::pin(bytes);
        let mut done = false;

        while !done {
            let next = tokio::time::timeout(idle, bytes.next())
                .await
                .map_err(|_| anyhow::anyhow!("LLM stream stalled: no data for {:?}", idle))?;
            let chunk = match next {
                Some(chunk) => chunk.map_err(Into::<anyhow::Error>::into)?,
                None => break,
            };
            for frame in decoder.feed(chunk.as_ref())? {
                match frame {
                    Frame::Delta(text) => yield text,
                    Frame::Done => {
                        done = true;
                        break;
                    }
                }
            }
        }

        if !done {
            for frame in decoder.finish()? {
                if let Frame::Delta(text) = frame {
                    yield text;
                }
            }
        }
    }
}
