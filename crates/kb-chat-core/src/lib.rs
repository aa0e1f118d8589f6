//! # kb-chat Core
//!
//! Shared, runtime-free logic for kb-chat: data models, text normalization,
//! tokenization, the knowledge index, relevance scoring, prompt
//! augmentation, and the conversation store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The root
//! `kb-chat` crate wires these pieces to SQLite, the LLM provider, and the
//! Axum server.
//!
//! ## Retrieval Pipeline
//!
//! ```text
//! question ──▶ normalize ──▶ tokenize ──▶ find_best_match ──▶ augment ──▶ LLM
//!                                              ▲
//!                                   KnowledgeIndex (built once)
//! ```

pub mod augment;
pub mod index;
pub mod models;
pub mod normalize;
pub mod scorer;
pub mod store;
pub mod tokenize;
