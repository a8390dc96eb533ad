//! SQLite conversation store
//!
//! Persists conversations, messages and matters in an embedded database.
//! Matter attachments are stored as a JSON array of strings.

use super::store::{ConversationStore, Matter, MessageStatus, StoredMessage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensemaker_llm::MessageRole;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

type MessageRow = (String, String, String, String, String, String);

/// SQLite-backed conversation store
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Open (or create) the database at `path`
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Internal(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Internal(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite message store initialized");
        Ok(store)
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT,
                summary TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ready',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matters (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                attachments TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite message schema initialized");
        Ok(())
    }

    /// Add or replace a matter
    pub async fn upsert_matter(&self, matter: &Matter) -> Result<()> {
        let attachments = serde_json::to_string(&matter.attachments)?;
        sqlx::query(
            r#"
            INSERT INTO matters (id, title, description, attachments)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                attachments = excluded.attachments
            "#,
        )
        .bind(&matter.id)
        .bind(&matter.title)
        .bind(&matter.description)
        .bind(&attachments)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_conversation(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO conversations (id) VALUES (?)")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert(&self, message: StoredMessage) -> Result<StoredMessage> {
        self.ensure_conversation(&message.conversation_id).await?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.status.as_str())
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(message_id = %message.id, status = message.status.as_str(), "message stored");
        Ok(message)
    }
}

fn from_row(row: MessageRow) -> Result<StoredMessage> {
    let (id, conversation_id, role, content, status, created_at) = row;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Store(format!("bad created_at on message {}: {}", id, e)))?
        .with_timezone(&Utc);

    Ok(StoredMessage {
        id,
        conversation_id,
        role: MessageRole::from_stored(&role),
        content,
        status: MessageStatus::from_stored(&status),
        created_at,
    })
}

#[async_trait]
impl ConversationStore for SqliteMessageStore {
    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, role, content, status, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY rowid DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().rev().map(from_row).collect()
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage> {
        self.insert(StoredMessage::new(conversation_id, role, content))
            .await
    }

    async fn create_placeholder(&self, conversation_id: &str) -> Result<StoredMessage> {
        self.insert(StoredMessage::placeholder(conversation_id)).await
    }

    async fn complete(&self, message_id: &str, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE messages SET content = ?, status = ? WHERE id = ?")
            .bind(content)
            .bind(MessageStatus::Ready.as_str())
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Store(format!("no such message: {}", message_id)));
        }
        debug!(message_id = %message_id, "message completed");
        Ok(())
    }

    async fn message(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, role, content, status, created_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    async fn matter(&self, matter_id: &str) -> Result<Option<Matter>> {
        let row: Option<(String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT id, title, description, attachments FROM matters WHERE id = ?",
        )
        .bind(matter_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, title, description, attachments)) = row else {
            return Ok(None);
        };
        Ok(Some(Matter {
            id,
            title,
            description,
            attachments: serde_json::from_str(&attachments)?,
        }))
    }

    async fn set_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        self.ensure_conversation(conversation_id).await?;
        sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn title(&self, conversation_id: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT title FROM conversations WHERE id = ?")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(title,)| title))
    }
}
