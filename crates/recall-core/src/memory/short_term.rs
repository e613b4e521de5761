//! ShortTermLog: append-only, capped, ordered message buffer per session.

use std::sync::Arc;

use chrono::Utc;
use recall_types::error::{MemoryError, RepositoryError};
use recall_types::message::{Message, NewMessage, Role};
use serde::Serialize;
use tracing::debug;

use super::locks::SessionLocks;
use super::pruning::{PruneReport, PruningPolicy};
use super::retry::RetryPolicy;
use crate::repository::fact::FactRepository;
use crate::repository::message::MessageRepository;

/// Result of an append: the stored message and the pruning it triggered.
#[derive(Debug, Clone, Serialize)]
pub struct AppendOutcome {
    pub message: Message,
    pub prune: PruneReport,
}

pub struct ShortTermLog<M: MessageRepository, F: FactRepository> {
    messages: Arc<M>,
    pruning: PruningPolicy<M, F>,
    locks: Arc<SessionLocks>,
    max_messages: usize,
    retry: RetryPolicy,
}

impl<M: MessageRepository, F: FactRepository> ShortTermLog<M, F> {
    pub fn new(
        messages: Arc<M>,
        pruning: PruningPolicy<M, F>,
        locks: Arc<SessionLocks>,
        max_messages: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            messages,
            pruning,
            locks,
            max_messages,
            retry,
        }
    }

    /// Append a message and enforce the cap before releasing the session lock.
    ///
    /// The session must already exist. A newly appended message may itself
    /// be evicted when every older message is pinned.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        pinned: bool,
    ) -> Result<AppendOutcome, MemoryError> {
        let _guard = self.locks.acquire(session_id).await;

        let new = NewMessage {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            pinned,
            created_at: Utc::now(),
        };
        let repo = &*self.messages;
        let new_ref = &new;
        let message = self
            .retry
            .run("append_message", move || repo.append_message(new_ref))
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => MemoryError::session_not_found(session_id),
                other => other.into(),
            })?;

        let count = self
            .retry
            .run("count_messages", move || repo.count_messages(session_id))
            .await?;

        let prune = if count > self.max_messages as u64 {
            self.pruning
                .enforce(session_id, self.max_messages, count)
                .await?
        } else {
            PruneReport::default()
        };

        debug!(session_id, seq = message.seq, %role, count, "appended message");
        Ok(AppendOutcome { message, prune })
    }

    /// The most recent `limit` messages, oldest first.
    pub async fn get_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let repo = &*self.messages;
        Ok(self
            .retry
            .run("get_recent", move || repo.get_recent(session_id, limit))
            .await?)
    }

    pub async fn count(&self, session_id: &str) -> Result<u64, MemoryError> {
        let repo = &*self.messages;
        Ok(self
            .retry
            .run("count_messages", move || repo.count_messages(session_id))
            .await?)
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::box_embedder::BoxEmbedder;
    use crate::memory::index::LongTermIndex;
    use crate::repository::fakes::{InMemoryStore, KeywordEmbedder};
    use crate::repository::session::SessionRepository;
    use recall_types::config::RetryConfig;
    use recall_types::session::Session;
    use std::time::Duration;

    async fn log_with_cap(store: &InMemoryStore, max: usize) -> ShortTermLog<InMemoryStore, InMemoryStore> {
        store
            .create_session_if_absent(&Session::new("s1", "test", "u"))
            .await
            .unwrap();
        let retry = RetryPolicy::new(
            RetryConfig {
                initial_delay_ms: 1,
                ..RetryConfig::default()
            },
            Duration::from_secs(1),
        );
        let locks = Arc::new(SessionLocks::new());
        let repo = Arc::new(store.clone());
        let index = Arc::new(LongTermIndex::new(
            Arc::clone(&repo),
            Some(Arc::new(BoxEmbedder::new(KeywordEmbedder::new(&["x"])))),
            Arc::clone(&locks),
            retry.clone(),
            Duration::from_millis(100),
        ));
        let pruning = PruningPolicy::new(Arc::clone(&repo), index, None, Duration::from_millis(100), retry.clone());
        ShortTermLog::new(repo, pruning, locks, max, retry)
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_cap_three_keeps_last_three() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 3).await;
        for content in ["A", "B", "C", "D", "E"] {
            log.append("s1", Role::User, content, false).await.unwrap();
            assert!(log.count("s1").await.unwrap() <= 3);
        }
        let recent = log.get_recent("s1", 10).await.unwrap();
        assert_eq!(contents(&recent), vec!["C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_append_then_get_recent_includes_message() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 10).await;
        let outcome = log.append("s1", Role::Assistant, "hello", false).await.unwrap();
        assert_eq!(outcome.message.seq, 1);
        assert!(outcome.prune.is_empty());

        let recent = log.get_recent("s1", 10).await.unwrap();
        assert_eq!(recent, vec![outcome.message]);
    }

    #[tokio::test]
    async fn test_seq_never_reused_after_eviction() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 1).await;
        let mut seqs = Vec::new();
        for content in ["a", "b", "c"] {
            seqs.push(log.append("s1", Role::User, content, false).await.unwrap().message.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_new_message_evicted_when_rest_pinned() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 1).await;
        log.append("s1", Role::System, "rules", true).await.unwrap();

        let outcome = log.append("s1", Role::User, "hi", false).await.unwrap();
        assert_eq!(outcome.prune.evicted, vec![outcome.message.seq]);
        assert_eq!(contents(&log.get_recent("s1", 10).await.unwrap()), vec!["rules"]);
    }

    #[tokio::test]
    async fn test_pinned_messages_can_exceed_cap() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 1).await;
        log.append("s1", Role::System, "a", true).await.unwrap();
        let outcome = log.append("s1", Role::System, "b", true).await.unwrap();
        assert!(outcome.prune.pinned_overflow);
        assert_eq!(log.count("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 3).await;
        let err = log.append("ghost", Role::User, "x", false).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_get_recent_limit() {
        let store = InMemoryStore::new();
        let log = log_with_cap(&store, 10).await;
        for content in ["a", "b", "c", "d"] {
            log.append("s1", Role::User, content, false).await.unwrap();
        }
        assert_eq!(contents(&log.get_recent("s1", 2).await.unwrap()), vec!["c", "d"]);
        assert!(log.get_recent("s1", 0).await.unwrap().is_empty());
        assert!(log.get_recent("other", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_respect_cap() {
        let store = InMemoryStore::new();
        let log = Arc::new(log_with_cap(&store, 5).await);
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let log = Arc::clone(&log);
                tokio::spawn(async move { log.append("s1", Role::User, &format!("m{i}"), false).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(log.count("s1").await.unwrap(), 5);
        let seqs: Vec<u64> = log.get_recent("s1", 10).await.unwrap().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![16, 17, 18, 19, 20]);
    }
}
