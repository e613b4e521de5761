//! SQLite short-term message repository implementation.
//!
//! Sequence numbers come from `sessions.last_seq`, bumped inside the same
//! transaction as the insert, so a seq is never reused even after the
//! newest message is evicted.

use recall_core::repository::message::MessageRepository;
use recall_types::error::RepositoryError;
use recall_types::message::{Message, NewMessage, Role};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, map_sqlx_error, parse_datetime};

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct MessageRow {
    session_id: String,
    seq: i64,
    role: String,
    content: String,
    pinned: i64,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            seq: row.try_get("seq")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            pinned: row.try_get("pinned")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let role: Role = self.role.parse().map_err(RepositoryError::Query)?;
        Ok(Message {
            session_id: self.session_id,
            seq: self.seq as u64,
            role,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
            pinned: self.pinned != 0,
        })
    }
}

fn rows_to_messages(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Message>, RepositoryError> {
    rows.iter()
        .map(|r| {
            MessageRow::from_row(r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_message()
        })
        .collect()
}

const MESSAGE_COLUMNS: &str = "session_id, seq, role, content, pinned, created_at";

impl MessageRepository for SqliteMessageRepository {
    async fn append_message(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_error)?;

        let seq: Option<i64> = sqlx::query_scalar(
            "UPDATE sessions SET last_seq = last_seq + 1 WHERE id = ? RETURNING last_seq",
        )
        .bind(&message.session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let Some(seq) = seq else {
            return Err(RepositoryError::NotFound);
        };

        sqlx::query(
            "INSERT INTO messages (session_id, seq, role, content, pinned, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(seq)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(if message.pinned { 1i64 } else { 0i64 })
        .bind(format_datetime(&message.created_at))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Message {
            session_id: message.session_id.clone(),
            seq: seq as u64,
            role: message.role,
            content: message.content.clone(),
            created_at: message.created_at,
            pinned: message.pinned,
        })
    }

    async fn get_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                 SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ? ORDER BY seq DESC LIMIT ?
             ) ORDER BY seq ASC"
        ))
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        rows_to_messages(&rows)
    }

    async fn count_messages(&self, session_id: &str) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }

    async fn oldest_unpinned(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE session_id = ? AND pinned = 0
             ORDER BY seq ASC LIMIT ?"
        ))
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        rows_to_messages(&rows)
    }

    async fn delete_message(&self, session_id: &str, seq: u64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ? AND seq = ?")
            .bind(session_id)
            .bind(seq as i64)
            .execute(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
