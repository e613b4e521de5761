//! SessionRepository trait definition.

use recall_types::error::RepositoryError;
use recall_types::session::Session;
use chrono::{DateTime, Utc};

/// Repository trait for session records.
///
/// Implementations live in recall-infra (e.g., `SqliteSessionRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionRepository: Send + Sync {
    /// Get a session by its external id.
    fn get_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Insert the session unless one with the same id exists.
    ///
    /// Returns the stored record, which is the pre-existing one when another
    /// writer created it first.
    fn create_session_if_absent(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<Session, RepositoryError>> + Send;

    /// Set `last_active`. Returns `false` when no such session exists.
    fn touch_session(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All sessions, most recently active first.
    fn list_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, RepositoryError>> + Send;
}
