use std::sync::{Mutex, OnceLock};

use crate::persistence::Persistence;
use crate::store::MemoryDatabase;
use crate::types::{Conversation, Message, SortKey, User};

/// Global test utilities
///
/// Provides a process-wide mutex to serialize tests that mutate process-wide
/// state (like environment variables). Use this to avoid flaky tests when
/// `cargo test` runs tests in parallel.
pub fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub fn create_test_db() -> Persistence {
    use tempfile::tempdir;
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.duckdb");
    // Leak the temp dir to keep it alive for the test duration
    std::mem::forget(dir);
    Persistence::new(&db_path).unwrap()
}

pub fn user(id: &str, key: i64) -> User {
    User {
        id: id.to_string(),
        sort_key: SortKey(key),
        username: id.to_string(),
        name: id.to_uppercase(),
        email: None,
        avatar: None,
    }
}

pub fn conversation(id: &str, key: i64, recipients: &[&str]) -> Conversation {
    Conversation {
        id: id.to_string(),
        sort_key: SortKey(key),
        title: None,
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
        created_at: chrono::Utc::now(),
    }
}

pub fn message(id: &str, key: i64, conversation_id: &str, sender_id: &str) -> Message {
    Message {
        id: id.to_string(),
        sort_key: SortKey(key),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content: format!("message {}", id),
        created_at: chrono::Utc::now(),
    }
}

/// A memory database with `messages` messages (sort keys `1..=messages`)
/// in conversation `c1` between `alice` and `bob`.
pub async fn seeded_memory_db(messages: i64) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.users.insert(user("alice", 1)).await;
    db.users.insert(user("bob", 2)).await;
    db.users.insert(user("carol", 3)).await;
    db.conversations
        .insert(conversation("c1", 1, &["alice", "bob"]))
        .await;
    for key in 1..=messages {
        let sender = if key % 2 == 0 { "bob" } else { "alice" };
        db.messages
            .insert(message(&format!("m{}", key), key, "c1", sender))
            .await;
    }
    db
}
