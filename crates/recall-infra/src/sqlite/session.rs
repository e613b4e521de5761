//! SQLite session repository implementation.

use chrono::{DateTime, Utc};
use recall_core::repository::session::SessionRepository;
use recall_types::error::RepositoryError;
use recall_types::session::Session;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, map_sqlx_error, parse_datetime};

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct SessionRow {
    id: String,
    platform: String,
    user: String,
    created_at: String,
    last_active: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            platform: row.try_get("platform")?,
            user: row.try_get("user")?,
            created_at: row.try_get("created_at")?,
            last_active: row.try_get("last_active")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        Ok(Session {
            id: self.id,
            platform: self.platform,
            user: self.user,
            created_at: parse_datetime(&self.created_at)?,
            last_active: parse_datetime(&self.last_active)?,
        })
    }
}

const SESSION_COLUMNS: &str = "id, platform, user, created_at, last_active";

impl SessionRepository for SqliteSessionRepository {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
            .bind(session_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|r| {
            SessionRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_session()
        })
        .transpose()
    }

    async fn create_session_if_absent(&self, session: &Session) -> Result<Session, RepositoryError> {
        // INSERT OR IGNORE keeps the first creator's row; both racers then
        // read the same record back from the writer.
        sqlx::query(
            "INSERT OR IGNORE INTO sessions (id, platform, user, created_at, last_active, last_seq)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&session.id)
        .bind(&session.platform)
        .bind(&session.user)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.last_active))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
            .bind(&session.id)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;

        SessionRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_session()
    }

    async fn touch_session(&self, session_id: &str, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE sessions SET last_active = ? WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(session_id)
            .execute(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY last_active DESC, id ASC"
        ))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|r| {
                SessionRow::from_row(r)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_session()
            })
            .collect()
    }
}
