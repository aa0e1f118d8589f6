//! Knowledge index: the static question/answer entries and their
//! precomputed searchable representation.
//!
//! The index is built once at startup via [`build_index`] and never
//! mutated afterwards, so it can be shared behind an `Arc` by any number of
//! concurrent readers.
//!
//! # Dataset Format
//!
//! A JSON array of entries:
//!
//! ```json
//! [
//!   { "id": "kb-1", "question": "What is UNASAT?", "answer": "An org.",
//!     "combinedText": "optional extra text", "metadata": { "any": "json" } }
//! ]
//! ```

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::normalize::normalize;
use crate::tokenize::tokenize;

/// One static question/answer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A [`KnowledgeEntry`] with its precomputed searchable representation.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub entry: KnowledgeEntry,
    /// Question, answer and combined text joined by single spaces.
    pub searchable_text: String,
    /// Terms of `searchable_text` in order, duplicates preserved.
    pub tokens: Vec<String>,
    pub(crate) normalized_question: String,
    pub(crate) normalized_text: String,
    pub(crate) token_set: HashSet<String>,
}

impl IndexedEntry {
    pub fn new(entry: KnowledgeEntry) -> Self {
        let searchable_text = format!(
            "{} {} {}",
            entry.question,
            entry.answer,
            entry.combined_text.as_deref().unwrap_or("")
        );
        let tokens = tokenize(&searchable_text);
        let token_set = tokens.iter().cloned().collect();

        Self {
            normalized_question: normalize(&entry.question),
            normalized_text: normalize(&searchable_text),
            searchable_text,
            tokens,
            token_set,
            entry,
        }
    }
}

/// Immutable collection of indexed knowledge entries, in dataset order.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeIndex {
    entries: Vec<IndexedEntry>,
}

impl KnowledgeIndex {
    /// An index with no entries; retrieval never matches.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON dataset and index it.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not an array of entries with at least
    /// `id`, `question`, and `answer` string fields.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<KnowledgeEntry> =
            serde_json::from_str(json).context("Failed to parse knowledge dataset")?;
        Ok(build_index(entries))
    }

    pub fn entries(&self) -> &[IndexedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index raw entries, preserving their order.
pub fn build_index(entries: Vec<KnowledgeEntry>) -> KnowledgeIndex {
    KnowledgeIndex {
        entries: entries.into_iter().map(IndexedEntry::new).collect(),
    }
}
