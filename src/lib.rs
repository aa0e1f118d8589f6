//! # kb-chat
//!
//! A chat backend that grounds a hosted language model in a small, static
//! question–answer knowledge base, streams answers to the client as
//! Server-Sent Events, and keeps conversation history in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  POST /chat  ┌─────────────┐  prompt   ┌──────────────┐
//! │  Client  │─────────────▶│ ChatService │──────────▶│ ChatProvider │
//! │ (SSE)    │◀─────────────│   + relay   │◀──────────│ (upstream)   │
//! └──────────┘   data: ...  └──────┬──────┘  deltas   └──────────────┘
//!                                  │
//!                    ┌─────────────┴─────────────┐
//!                    ▼                           ▼
//!             ┌──────────────┐           ┌──────────────┐
//!             │KnowledgeIndex│           │   SQLite     │
//!             │ + scorer     │           │ conversations│
//!             └──────────────┘           └──────────────┘
//! ```
//!
//! Retrieval, prompt augmentation and the storage trait live in the
//! runtime-free [`kb_chat_core`] crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite conversation store |
//! | [`knowledge`] | Knowledge dataset loading |
//! | [`llm`] | Upstream chat-completion providers |
//! | [`relay`] | Chat turns and the stream relay |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod relay;
pub mod server;
pub mod sqlite_store;
