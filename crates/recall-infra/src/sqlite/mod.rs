//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod fact;
pub mod message;
pub mod pool;
pub mod session;

use chrono::{DateTime, SecondsFormat, Utc};
use recall_types::error::RepositoryError;

/// Classify a sqlx error for the retry layer.
///
/// Busy/locked databases, pool exhaustion, and I/O failures are transient
/// (`Connection`); UNIQUE violations are `Conflict`; the rest is `Query`.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection(e.to_string())
        }
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("database is locked") || message.contains("database is busy") {
                RepositoryError::Connection(e.to_string())
            } else if message.contains("UNIQUE") {
                RepositoryError::Conflict(e.to_string())
            } else {
                RepositoryError::Query(e.to_string())
            }
        }
        _ => RepositoryError::Query(e.to_string()),
    }
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> pool::DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    // Leak tempdir so it lives for the test
    std::mem::forget(dir);
    pool::DatabasePool::new(&url).await.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_roundtrip_preserves_order() {
        let early = DateTime::parse_from_rfc3339("2025-01-01T10:00:00.5Z").unwrap().to_utc();
        let late = DateTime::parse_from_rfc3339("2025-01-01T10:00:00.123456Z").unwrap().to_utc();
        let (a, b) = (format_datetime(&late), format_datetime(&early));
        assert!(a < b);
        assert_eq!(parse_datetime(&a).unwrap(), late);
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!map_sqlx_error(sqlx::Error::RowNotFound).is_transient());
    }
}
