//! SQLite connection pool.
//!
//! Every pooled connection runs in WAL mode with `foreign_keys` on; without
//! it SQLite ignores `ON DELETE CASCADE` and deleting a conversation would
//! leave its messages behind. The database file and its parent directory
//! are created on first use.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a pool on the database at `[db].path`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.db.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options(path))
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

fn options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::ConnectOptions;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        let content = format!(
            "[db]\npath = \"{}\"\n\n[server]\nbind = \"127.0.0.1:0\"\n",
            tmp.path().join("nested").join("kbchat.sqlite").display()
        );
        toml::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_connect_creates_file_with_pragmas() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(&tmp);
        let pool = connect(&cfg).await.unwrap();
        assert!(cfg.db.path.exists());

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    /// Deletes only cascade when the connection enforces foreign keys.
    #[tokio::test]
    async fn test_cascade_requires_foreign_keys() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(&tmp);
        let pool = connect(&cfg).await.unwrap();
        crate::migrate::apply_schema(&pool).await.unwrap();

        let seed = |conv: &'static str| {
            let pool = pool.clone();
            async move {
                sqlx::query("INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?, 't', 0, 0)")
                    .bind(conv)
                    .execute(&pool)
                    .await
                    .unwrap();
                sqlx::query("INSERT INTO messages (id, conversation_id, role, content, created_at) VALUES (?, ?, 'user', 'hi', 0)")
                    .bind(format!("{}-m", conv))
                    .bind(conv)
                    .execute(&pool)
                    .await
                    .unwrap();
            }
        };
        seed("enforced").await;
        seed("unenforced").await;

        sqlx::query("DELETE FROM conversations WHERE id = 'enforced'")
            .execute(&pool)
            .await
            .unwrap();
        let left: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = 'enforced'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(left, 0);
        pool.close().await;

        let mut raw = options(&cfg.db.path)
            .foreign_keys(false)
            .connect()
            .await
            .unwrap();
        sqlx::query("DELETE FROM conversations WHERE id = 'unenforced'")
            .execute(&mut raw)
            .await
            .unwrap();
        let orphans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = 'unenforced'",
        )
        .fetch_one(&mut raw)
        .await
        .unwrap();
        assert_eq!(orphans, 1);
    }

    #[tokio::test]
    async fn test_orphan_message_rejected() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(&tmp);
        let pool = connect(&cfg).await.unwrap();
        crate::migrate::apply_schema(&pool).await.unwrap();

        let result = sqlx::query("INSERT INTO messages (id, conversation_id, role, content, created_at) VALUES ('m', 'missing', 'user', 'hi', 0)")
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }
}
