use std::time::Duration;
use tempfile::TempDir;

use kb_chat::config::Config;
use kb_chat::sqlite_store::SqliteStore;
use kb_chat::{db, migrate};
use kb_chat_core::models::Role;
use kb_chat_core::store::ConversationStore;

fn test_config(tmp: &TempDir) -> Config {
    let config_content = format!(
        r#"[db]
path = "{}"

[server]
bind = "127.0.0.1:0"
"#,
        tmp.path().join("kbchat.sqlite").display()
    );
    toml::from_str(&config_content).unwrap()
}

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let cfg = test_config(tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    SqliteStore::new(db::connect(&cfg).await.unwrap())
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
}

#[tokio::test]
async fn test_messages_round_trip_in_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let conv = store.create_conversation("New Chat").await.unwrap();
    store
        .append_message(&conv.id, Role::User, "first")
        .await
        .unwrap();
    store
        .append_message(&conv.id, Role::Assistant, "second")
        .await
        .unwrap();
    store
        .append_message(&conv.id, Role::User, "third")
        .await
        .unwrap();

    let messages = store.list_messages(&conv.id).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(store.count_messages(&conv.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_delete_cascades_to_messages() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let conv = store.create_conversation("doomed").await.unwrap();
    store
        .append_message(&conv.id, Role::User, "hello")
        .await
        .unwrap();

    assert!(store.delete_conversation(&conv.id).await.unwrap());
    assert!(store.get_conversation(&conv.id).await.unwrap().is_none());
    assert!(store.list_messages(&conv.id).await.unwrap().is_empty());

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(orphans, 0);

    assert!(!store.delete_conversation(&conv.id).await.unwrap());
}

#[tokio::test]
async fn test_rejects_orphan_and_system_messages() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert!(store
        .append_message("missing", Role::User, "hello")
        .await
        .is_err());

    let conv = store.create_conversation("New Chat").await.unwrap();
    assert!(store
        .append_message(&conv.id, Role::System, "be nice")
        .await
        .is_err());
}

#[tokio::test]
async fn test_list_orders_by_recent_update() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let older = store.create_conversation("older").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = store.create_conversation("newer").await.unwrap();

    let list = store.list_conversations().await.unwrap();
    assert_eq!(list[0].id, newer.id);
    assert_eq!(list[1].id, older.id);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let msg = store
        .append_message(&older.id, Role::Assistant, "reply")
        .await
        .unwrap();
    store
        .touch_conversation(&older.id, msg.created_at)
        .await
        .unwrap();
    store.set_title(&older.id, "renamed").await.unwrap();

    let list = store.list_conversations().await.unwrap();
    assert_eq!(list[0].id, older.id);
    assert_eq!(list[0].title, "renamed");
    assert_eq!(list[0].updated_at, msg.created_at);
}
