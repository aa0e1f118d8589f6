//! Knowledge dataset loading.
//!
//! Reads the JSON dataset named by `[knowledge].path` once at startup and
//! builds the [`KnowledgeIndex`]. A missing or malformed dataset is not
//! fatal: it is logged and the server runs without retrieval augmentation.

use anyhow::{Context, Result};
use std::path::Path;

use kb_chat_core::index::KnowledgeIndex;

use crate::config::Config;

/// Read and index the dataset at `path`.
pub fn read_index(path: &Path) -> Result<KnowledgeIndex> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read knowledge dataset: {}", path.display()))?;
    KnowledgeIndex::from_json(&json)
        .with_context(|| format!("Invalid knowledge dataset: {}", path.display()))
}

/// Load the configured dataset, degrading to an empty index on failure.
pub fn load_index(config: &Config) -> KnowledgeIndex {
    match read_index(&config.knowledge.path) {
        Ok(index) => {
            tracing::info!(
                entries = index.len(),
                path = %config.knowledge.path.display(),
                "knowledge index built"
            );
            index
        }
        Err(e) => {
            tracing::warn!(
                error = %format!("{:#}", e),
                "knowledge dataset unavailable; answering without retrieval"
            );
            KnowledgeIndex::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.json");
        fs::write(
            &path,
            r#"[{"id": "1", "question": "What is UNASAT?", "answer": "An org."}]"#,
        )
        .unwrap();
        let index = read_index(&path).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = read_index(&tmp.path().join("nope.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read knowledge dataset"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.json");
        fs::write(&path, "[{\"id\": 1}").unwrap();
        assert!(read_index(&path).is_err());
    }
}
