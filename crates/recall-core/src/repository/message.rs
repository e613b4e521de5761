//! MessageRepository trait definition.
//!
//! Storage interface for the per-session short-term log. The infrastructure
//! layer (recall-infra) implements this trait with SQLite persistence.

use recall_types::error::RepositoryError;
use recall_types::message::{Message, NewMessage};

/// Repository trait for short-term message persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MessageRepository: Send + Sync {
    /// Persist a message, assigning the next sequence number of its session.
    ///
    /// Sequence numbers come from a per-session counter, so they stay strictly
    /// increasing even after the newest message was evicted. Fails with
    /// `NotFound` if the session does not exist.
    fn append_message(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// The most recent `limit` messages of a session, ordered by seq ASC.
    fn get_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Number of messages currently held for a session.
    fn count_messages(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// The oldest `limit` unpinned messages of a session, ordered by seq ASC.
    fn oldest_unpinned(
        &self,
        session_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Delete one message. Returns `false` if it was already gone.
    fn delete_message(
        &self,
        session_id: &str,
        seq: u64,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
