use anyhow::{Context, Result};
use duckdb::Connection;

pub fn run(conn: &Connection) -> Result<()> {
    // Schema version table, then every pending migration in order.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .context("creating schema_migrations table")?;

    let current = current_version(conn)?;
    let mut migrations_applied = false;

    if current < 1 {
        apply_v1(conn)?;
        set_version(conn, 1)?;
        migrations_applied = true;
    }

    if current < 2 {
        apply_v2(conn)?;
        set_version(conn, 2)?;
        migrations_applied = true;
    }

    // Merge the WAL so schema changes are not replayed on the next open.
    if migrations_applied {
        conn.execute_batch("FORCE CHECKPOINT;")
            .context("forcing checkpoint after migrations")?;
    }

    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")?;
    let v: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(v)
}

fn set_version(conn: &Connection, v: i64) -> Result<()> {
    conn.execute("INSERT INTO schema_migrations (version) VALUES (?)", [v])?;
    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<()> {
    // Core tables: users, conversations (+ recipients), messages.
    // Each table draws its sort keys from its own sequence.
    conn.execute_batch(
        r#"
        CREATE SEQUENCE IF NOT EXISTS users_sort_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS conversations_sort_seq START 1;
        CREATE SEQUENCE IF NOT EXISTS messages_sort_seq START 1;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            sort_key BIGINT NOT NULL DEFAULT nextval('users_sort_seq'),
            username TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            email TEXT,
            avatar TEXT
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            sort_key BIGINT NOT NULL DEFAULT nextval('conversations_sort_seq'),
            title TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_recipients (
            conversation_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            sort_key BIGINT NOT NULL DEFAULT nextval('messages_sort_seq'),
            conversation_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .context("applying v1 schema")?;

    Ok(())
}

fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_users_sort ON users(sort_key);
        CREATE INDEX IF NOT EXISTS idx_conversations_sort ON conversations(sort_key);
        CREATE INDEX IF NOT EXISTS idx_recipients_user ON conversation_recipients(user_id);
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, sort_key);
        CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);
        "#,
    )
    .context("applying v2 schema (pagination indexes)")?;

    Ok(())
}
