//! SessionStore: one record per conversation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recall_types::error::MemoryError;
use recall_types::session::{Session, SessionState};
use tracing::{debug, info};

use super::retry::RetryPolicy;
use crate::repository::session::SessionRepository;

pub struct SessionStore<S: SessionRepository> {
    repo: Arc<S>,
    idle_timeout: chrono::Duration,
    retry: RetryPolicy,
}

impl<S: SessionRepository> SessionStore<S> {
    pub fn new(repo: Arc<S>, idle_timeout: chrono::Duration, retry: RetryPolicy) -> Self {
        Self {
            repo,
            idle_timeout,
            retry,
        }
    }

    /// Return the session for `id`, creating it on first sight.
    ///
    /// Concurrent callers converge on a single record; the first writer's
    /// platform and user are kept.
    pub async fn get_or_create(&self, id: &str, platform: &str, user: &str) -> Result<Session, MemoryError> {
        if id.trim().is_empty() {
            return Err(MemoryError::InvalidInput("session id must not be empty".to_string()));
        }
        let repo = &*self.repo;
        if let Some(existing) = self.retry.run("get_session", move || repo.get_session(id)).await? {
            return Ok(existing);
        }

        let candidate = Session::new(id, platform, user);
        let candidate_ref = &candidate;
        let session = self
            .retry
            .run("create_session", move || repo.create_session_if_absent(candidate_ref))
            .await?;
        info!(session_id = id, platform = %session.platform, "session opened");
        Ok(session)
    }

    /// Mark the session active now.
    pub async fn touch(&self, id: &str) -> Result<(), MemoryError> {
        let repo = &*self.repo;
        let now = Utc::now();
        let found = self
            .retry
            .run("touch_session", move || repo.touch_session(id, now))
            .await?;
        if !found {
            return Err(MemoryError::session_not_found(id));
        }
        debug!(session_id = id, "session touched");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Session, MemoryError> {
        let repo = &*self.repo;
        self.retry
            .run("get_session", move || repo.get_session(id))
            .await?
            .ok_or_else(|| MemoryError::session_not_found(id))
    }

    /// All sessions, most recently active first.
    pub async fn list(&self) -> Result<Vec<Session>, MemoryError> {
        let repo = &*self.repo;
        Ok(self.retry.run("list_sessions", move || repo.list_sessions()).await?)
    }

    /// Advisory lifecycle state; idleness is computed, never enforced.
    pub fn state(&self, session: &Session, has_messages: bool, now: DateTime<Utc>) -> SessionState {
        session.state(has_messages, self.idle_timeout, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fakes::InMemoryStore;
    use recall_types::config::RetryConfig;
    use std::time::Duration;

    fn store() -> SessionStore<InMemoryStore> {
        SessionStore::new(
            Arc::new(InMemoryStore::new()),
            chrono::Duration::minutes(30),
            RetryPolicy::new(RetryConfig::default(), Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let sessions = store();
        let first = sessions.get_or_create("tg:1", "telegram", "alice").await.unwrap();
        let second = sessions.get_or_create("tg:1", "discord", "bob").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.platform, "telegram");
        assert_eq!(sessions.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creators_converge() {
        let sessions = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sessions = Arc::clone(&sessions);
                tokio::spawn(async move { sessions.get_or_create("s", "p", &format!("u{i}")).await })
            })
            .collect();
        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap().unwrap());
        }
        assert!(created.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(sessions.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_touch_updates_last_active() {
        let sessions = store();
        let created = sessions.get_or_create("s", "p", "u").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        sessions.touch("s").await.unwrap();
        let touched = sessions.get("s").await.unwrap();
        assert!(touched.last_active > created.last_active);
        assert_eq!(touched.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let sessions = store();
        assert!(sessions.touch("missing").await.unwrap_err().is_not_found());
        assert!(sessions.get("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let sessions = store();
        let err = sessions.get_or_create(" ", "p", "u").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_list_orders_by_recency() {
        let sessions = store();
        sessions.get_or_create("old", "p", "u").await.unwrap();
        sessions.get_or_create("new", "p", "u").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        sessions.touch("old").await.unwrap();

        let ids: Vec<String> = sessions.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let sessions = store();
        let session = sessions.get_or_create("s", "p", "u").await.unwrap();
        let now = session.last_active;
        assert_eq!(sessions.state(&session, false, now), SessionState::Created);
        assert_eq!(sessions.state(&session, true, now), SessionState::Active);
        assert_eq!(
            sessions.state(&session, true, now + chrono::Duration::hours(1)),
            SessionState::Idle
        );
    }
}
