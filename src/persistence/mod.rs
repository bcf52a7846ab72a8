pub mod migrations;
pub mod sql;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use duckdb::types::Type;
use duckdb::{params, params_from_iter, Connection, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::store::{Filter, RecordStore, StoreQuery};
use crate::types::{Conversation, Message, SortKey, User};
use sql::TableSpec;

const USER_COLUMNS: &str = "t.id, t.sort_key, t.username, t.name, t.email, t.avatar";
const CONVERSATION_COLUMNS: &str = "t.id, t.sort_key, t.title, t.created_at";
const MESSAGE_COLUMNS: &str =
    "t.id, t.sort_key, t.conversation_id, t.sender_id, t.content, t.created_at";

/// DuckDB-backed record store for users, conversations and messages.
#[derive(Clone)]
pub struct Persistence {
    conn: Arc<Mutex<Connection>>,
}

impl Persistence {
    /// Create or open the database at the provided path and run migrations.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = expand_tilde(db_path.as_ref())?;
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).context("creating DB directory")?;
            }
        }
        let conn = Connection::open(&db_path).context("opening DuckDB")?;
        Self::from_connection(conn)
    }

    /// A throwaway database that lives as long as this handle.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory DuckDB")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::run(&conn).context("running migrations")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Checkpoint the database so all WAL data lands in the main file.
    /// Call this before shutdown.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch("CHECKPOINT;")
            .context("checkpointing database")
    }

    /// Exclusive access to the connection.
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock only means another statement panicked; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---------- Users ----------

    pub fn create_user(&self, username: &str, name: &str, email: Option<&str>) -> Result<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "INSERT INTO users (id, username, name, email) VALUES (?, ?, ?, ?) RETURNING sort_key",
        )?;
        let sort_key: i64 = stmt
            .query_row(params![id, username, name, email], |row| row.get(0))
            .with_context(|| format!("creating user {}", username))?;
        Ok(User {
            id,
            sort_key: SortKey(sort_key),
            username: username.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            avatar: None,
        })
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let query = StoreQuery::new(Filter::eq("id", user_id), Default::default());
        Ok(self.select(&sql::USERS, USER_COLUMNS, &query, 1, user_from_row)?.pop())
    }

    // ---------- Conversations ----------

    /// Insert a conversation and its recipient list in one transaction.
    pub fn create_conversation(
        &self,
        recipients: &[String],
        title: Option<&str>,
    ) -> Result<Conversation> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let mut recipients_dedup: Vec<String> = Vec::with_capacity(recipients.len());
        for r in recipients {
            if !recipients_dedup.contains(r) {
                recipients_dedup.push(r.clone());
            }
        }

        let mut conn = self.conn();
        let tx = conn.transaction().context("starting conversation insert")?;
        let sort_key: i64 = tx.query_row(
            "INSERT INTO conversations (id, title, created_at) VALUES (?, ?, ?) RETURNING sort_key",
            params![id, title, created_at.to_rfc3339()],
            |row| row.get(0),
        )?;
        for (position, user_id) in recipients_dedup.iter().enumerate() {
            tx.execute(
                "INSERT INTO conversation_recipients (conversation_id, user_id, position) VALUES (?, ?, ?)",
                params![id, user_id, position as i64],
            )?;
        }
        tx.commit().context("committing conversation insert")?;

        debug!(conversation_id = %id, sort_key, "created conversation");
        Ok(Conversation {
            id,
            sort_key: SortKey(sort_key),
            title: title.map(str::to_string),
            recipients: recipients_dedup,
            created_at,
        })
    }

    pub fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let query = StoreQuery::new(Filter::eq("id", conversation_id), Default::default());
        Ok(self.select_conversations(&query, 1)?.pop())
    }

    fn select_conversations(&self, query: &StoreQuery, limit: usize) -> Result<Vec<Conversation>> {
        let mut conversations = self.select(
            &sql::CONVERSATIONS,
            CONVERSATION_COLUMNS,
            query,
            limit,
            conversation_from_row,
        )?;
        let mut recipients = self.recipients_of(&conversations)?;
        for conversation in &mut conversations {
            conversation.recipients = recipients.remove(&conversation.id).unwrap_or_default();
        }
        Ok(conversations)
    }

    /// Recipient lists keyed by conversation id, each in insertion order.
    fn recipients_of(&self, conversations: &[Conversation]) -> Result<HashMap<String, Vec<String>>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        if conversations.is_empty() {
            return Ok(out);
        }
        let placeholders = vec!["?"; conversations.len()].join(", ");
        let sql = format!(
            "SELECT conversation_id, user_id FROM conversation_recipients \
             WHERE conversation_id IN ({}) ORDER BY conversation_id, position",
            placeholders
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).context("preparing recipient lookup")?;
        let rows = stmt.query_map(
            params_from_iter(conversations.iter().map(|c| c.id.as_str())),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        for row in rows {
            let (conversation_id, user_id) = row?;
            out.entry(conversation_id).or_default().push(user_id);
        }
        Ok(out)
    }

    // ---------- Messages ----------

    pub fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at) VALUES (?, ?, ?, ?, ?) RETURNING sort_key",
        )?;
        let sort_key: i64 = stmt.query_row(
            params![id, conversation_id, sender_id, content, created_at.to_rfc3339()],
            |row| row.get(0),
        )?;
        debug!(message_id = %id, conversation_id, sort_key, "created message");
        Ok(Message {
            id,
            sort_key: SortKey(sort_key),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    // ---------- Generic lookups ----------

    fn select<R>(
        &self,
        spec: &TableSpec,
        columns: &str,
        query: &StoreQuery,
        limit: usize,
        map_row: fn(&Row<'_>) -> duckdb::Result<R>,
    ) -> Result<Vec<R>> {
        if limit == 0 || query.filter.is_nothing() {
            return Ok(Vec::new());
        }
        let (sql, params) = sql::select(columns, spec, query, limit)?;
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("preparing select on {}", spec.table))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), map_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn count_where(&self, spec: &TableSpec, filter: &Filter) -> Result<u64> {
        if filter.is_nothing() {
            return Ok(0);
        }
        let mut params = Vec::new();
        let predicate = sql::where_clause(filter, spec, &mut params)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} {} WHERE {}",
            spec.table,
            sql::ALIAS,
            predicate
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let count: i64 = stmt.query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// Runs a blocking lookup off the async executor.
async fn blocking<T, F>(store: &Persistence, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Persistence) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .context("database task panicked")?
}

#[async_trait]
impl RecordStore<User> for Persistence {
    async fn find(&self, query: &StoreQuery, limit: usize) -> Result<Vec<User>> {
        let query = query.clone();
        blocking(self, move |p| {
            p.select(&sql::USERS, USER_COLUMNS, &query, limit, user_from_row)
        })
        .await
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        blocking(self, move |p| p.count_where(&sql::USERS, &filter)).await
    }
}

#[async_trait]
impl RecordStore<Conversation> for Persistence {
    async fn find(&self, query: &StoreQuery, limit: usize) -> Result<Vec<Conversation>> {
        let query = query.clone();
        blocking(self, move |p| p.select_conversations(&query, limit)).await
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        blocking(self, move |p| p.count_where(&sql::CONVERSATIONS, &filter)).await
    }
}

#[async_trait]
impl RecordStore<Message> for Persistence {
    async fn find(&self, query: &StoreQuery, limit: usize) -> Result<Vec<Message>> {
        let query = query.clone();
        blocking(self, move |p| {
            p.select(&sql::MESSAGES, MESSAGE_COLUMNS, &query, limit, message_from_row)
        })
        .await
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        blocking(self, move |p| p.count_where(&sql::MESSAGES, &filter)).await
    }
}

fn user_from_row(row: &Row<'_>) -> duckdb::Result<User> {
    Ok(User {
        id: row.get(0)?,
        sort_key: SortKey(row.get(1)?),
        username: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        avatar: row.get(5)?,
    })
}

/// Recipients live in a side table and are filled in by the caller.
fn conversation_from_row(row: &Row<'_>) -> duckdb::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        sort_key: SortKey(row.get(1)?),
        title: row.get(2)?,
        recipients: Vec::new(),
        created_at: timestamp_at(row, 3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> duckdb::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sort_key: SortKey(row.get(1)?),
        conversation_id: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if path_str == "~" {
        let base = BaseDirs::new().context("base directories not available")?;
        Ok(base.home_dir().to_path_buf())
    } else if let Some(stripped) = path_str.strip_prefix("~/") {
        let base = BaseDirs::new().context("base directories not available")?;
        Ok(base.home_dir().join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Order;

    #[test]
    fn expands_home_directory_prefix() {
        let base = BaseDirs::new().expect("home directory available");
        let expanded = expand_tilde(Path::new("~/db/feed.duckdb")).unwrap();
        assert_eq!(expanded, base.home_dir().join("db/feed.duckdb"));
        assert_eq!(
            expand_tilde(Path::new("/tmp/x.duckdb")).unwrap(),
            PathBuf::from("/tmp/x.duckdb")
        );
    }

    #[test]
    fn recipients_keep_insertion_order() {
        let p = Persistence::in_memory().unwrap();
        let convo = p
            .create_conversation(
                &["zed".to_string(), "amy".to_string(), "zed".to_string()],
                Some("team"),
            )
            .unwrap();
        assert_eq!(convo.recipients, vec!["zed", "amy"]);

        let loaded = p.get_conversation(&convo.id).unwrap().expect("stored");
        assert_eq!(loaded.recipients, vec!["zed", "amy"]);
        assert_eq!(loaded.title.as_deref(), Some("team"));
        assert_eq!(loaded.sort_key, convo.sort_key);
    }

    #[test]
    fn recipient_ids_may_contain_commas() {
        let p = Persistence::in_memory().unwrap();
        let recipients = vec!["a,b".to_string(), "c".to_string()];
        let convo = p.create_conversation(&recipients, None).unwrap();
        let other = p.create_conversation(&["c".to_string()], None).unwrap();

        let loaded = p.get_conversation(&convo.id).unwrap().expect("stored");
        assert_eq!(loaded.recipients, recipients);

        let query = StoreQuery::new(Filter::contains("recipients", "c"), Order::Ascending);
        let rows = p.select_conversations(&query, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].recipients, recipients);
        assert_eq!(rows[1].id, other.id);
        assert_eq!(rows[1].recipients, vec!["c"]);
    }

    #[test]
    fn corrupt_timestamps_surface_as_errors() {
        let p = Persistence::in_memory().unwrap();
        let m = p.create_message("c1", "u1", "hello").unwrap();
        p.conn()
            .execute(
                "UPDATE messages SET created_at = 'yesterday' WHERE id = ?",
                params![m.id],
            )
            .unwrap();

        let query = StoreQuery::new(Filter::eq("conversationId", "c1"), Order::Descending);
        let err = p
            .select(&sql::MESSAGES, MESSAGE_COLUMNS, &query, 10, message_from_row)
            .unwrap_err();
        assert!(err.chain().any(|cause| matches!(
            cause.downcast_ref::<duckdb::Error>(),
            Some(duckdb::Error::FromSqlConversionFailure(5, Type::Text, _))
        )));
    }

    #[test]
    fn sort_keys_follow_insertion() {
        let p = Persistence::in_memory().unwrap();
        let a = p.create_message("c1", "u1", "first").unwrap();
        let b = p.create_message("c1", "u1", "second").unwrap();
        assert!(a.sort_key < b.sort_key);

        let query = StoreQuery::new(Filter::eq("conversationId", "c1"), Order::Descending);
        let rows = p
            .select(&sql::MESSAGES, MESSAGE_COLUMNS, &query, 10, message_from_row)
            .unwrap();
        assert_eq!(rows[0].id, b.id);
        assert_eq!(rows[1].id, a.id);
    }
}
