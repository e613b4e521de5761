//! In-memory repositories and capability mocks for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use recall_types::error::{ProviderError, RepositoryError};
use recall_types::memory::{Fact, Promotion, Scope, UpsertOutcome};
use recall_types::message::{Message, NewMessage};
use recall_types::session::Session;

use crate::memory::embedder::Embedder;
use crate::memory::summarizer::Summarizer;
use crate::repository::fact::FactRepository;
use crate::repository::message::MessageRepository;
use crate::repository::session::SessionRepository;

#[derive(Default)]
struct State {
    sessions: HashMap<String, Session>,
    last_seq: HashMap<String, u64>,
    messages: HashMap<String, BTreeMap<u64, Message>>,
    facts: HashMap<(Scope, String), Fact>,
}

/// Shared in-memory backend implementing every repository trait.
///
/// Clones share state. `fail_next(n)` makes the next `n` calls fail with a
/// transient connection error.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    failures: Arc<AtomicU32>,
    pub calls: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Connection("database is locked".to_string()));
        }
        Ok(())
    }

    pub fn fact_count(&self) -> usize {
        self.state.lock().unwrap().facts.len()
    }
}

impl SessionRepository for InMemoryStore {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        self.check()?;
        Ok(self.state.lock().unwrap().sessions.get(session_id).cloned())
    }

    async fn create_session_if_absent(&self, session: &Session) -> Result<Session, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .entry(session.id.clone())
            .or_insert_with(|| session.clone())
            .clone())
    }

    async fn touch_session(&self, session_id: &str, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        match state.sessions.get_mut(session_id) {
            Some(session) => {
                session.last_active = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, RepositoryError> {
        self.check()?;
        let mut sessions: Vec<Session> =
            self.state.lock().unwrap().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(sessions)
    }
}

impl MessageRepository for InMemoryStore {
    async fn append_message(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if !state.sessions.contains_key(&message.session_id) {
            return Err(RepositoryError::NotFound);
        }
        let seq = {
            let last = state.last_seq.entry(message.session_id.clone()).or_insert(0);
            *last += 1;
            *last
        };
        let stored = Message {
            session_id: message.session_id.clone(),
            seq,
            role: message.role,
            content: message.content.clone(),
            created_at: message.created_at,
            pinned: message.pinned,
        };
        state
            .messages
            .entry(message.session_id.clone())
            .or_default()
            .insert(seq, stored.clone());
        Ok(stored)
    }

    async fn get_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let Some(log) = state.messages.get(session_id) else {
            return Ok(vec![]);
        };
        let mut recent: Vec<Message> = log.values().rev().take(limit).cloned().collect();
        recent.reverse();
        Ok(recent)
    }

    async fn count_messages(&self, session_id: &str) -> Result<u64, RepositoryError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.messages.get(session_id).map_or(0, |log| log.len() as u64))
    }

    async fn oldest_unpinned(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .get(session_id)
            .map(|log| {
                log.values()
                    .filter(|m| !m.pinned)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_message(&self, session_id: &str, seq: u64) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(state
            .messages
            .get_mut(session_id)
            .is_some_and(|log| log.remove(&seq).is_some()))
    }
}

impl FactRepository for InMemoryStore {
    async fn upsert_fact(&self, fact: &Fact) -> Result<UpsertOutcome, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let id = (fact.scope.clone(), fact.key.clone());
        match state.facts.get_mut(&id) {
            Some(existing) if existing.write_ts >= fact.write_ts => Ok(UpsertOutcome::Superseded {
                current_write_ts: existing.write_ts,
            }),
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = Fact {
                    created_at,
                    ..fact.clone()
                };
                Ok(UpsertOutcome::Applied(existing.clone()))
            }
            None => {
                state.facts.insert(id, fact.clone());
                Ok(UpsertOutcome::Applied(fact.clone()))
            }
        }
    }

    async fn get_fact(&self, scope: &Scope, key: &str) -> Result<Option<Fact>, RepositoryError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.facts.get(&(scope.clone(), key.to_string())).cloned())
    }

    async fn delete_fact(&self, scope: &Scope, key: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(state.facts.remove(&(scope.clone(), key.to_string())).is_some())
    }

    async fn facts_in_scopes(&self, scopes: &[Scope]) -> Result<Vec<Fact>, RepositoryError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .facts
            .values()
            .filter(|f| scopes.contains(&f.scope))
            .cloned()
            .collect())
    }

    async fn facts_needing_reembed(&self, current_model: &str) -> Result<Vec<Fact>, RepositoryError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .facts
            .values()
            .filter(|f| f.embedding_model != current_model)
            .cloned()
            .collect())
    }

    async fn replace_embedding(
        &self,
        scope: &Scope,
        key: &str,
        expected_write_ts: i64,
        embedding: &[f32],
        embedding_model: &str,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        match state.facts.get_mut(&(scope.clone(), key.to_string())) {
            Some(existing) if existing.write_ts == expected_write_ts => {
                existing.embedding = embedding.to_vec();
                existing.embedding_model = embedding_model.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn search_keyword(&self, scopes: &[Scope], needle: &str, limit: usize) -> Result<Vec<Fact>, RepositoryError> {
        self.check()?;
        let needle = needle.to_lowercase();
        let state = self.state.lock().unwrap();
        let mut found: Vec<Fact> = state
            .facts
            .values()
            .filter(|f| scopes.contains(&f.scope))
            .filter(|f| f.key.to_lowercase().contains(&needle) || f.value.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.key.cmp(&b.key)));
        found.truncate(limit);
        Ok(found)
    }

    async fn count_facts(&self) -> Result<u64, RepositoryError> {
        self.check()?;
        Ok(self.state.lock().unwrap().facts.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Embedders
// ---------------------------------------------------------------------------

/// Bag-of-words embedder over a fixed vocabulary; unknown words land in the
/// last dimension.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    model: String,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
            model: "keyword-test".to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.vocabulary.len() + 1];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            match self.vocabulary.iter().position(|w| *w == word) {
                Some(i) => v[i] += 1.0,
                None => v[self.vocabulary.len()] += 0.1,
            }
        }
        v
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        let v = self.vectorize(text);
        async move { Ok(v) }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len() + 1
    }
}

/// Embedder that sleeps before answering; delay chosen per text.
pub struct DelayedEmbedder {
    pub inner: KeywordEmbedder,
    pub delays: HashMap<String, Duration>,
}

impl Embedder for DelayedEmbedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        let v = self.inner.vectorize(text);
        let delay = self.delays.get(text).copied().unwrap_or_default();
        async move {
            tokio::time::sleep(delay).await;
            Ok(v)
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Embedder that never answers in time.
pub struct HangingEmbedder;

impl Embedder for HangingEmbedder {
    fn embed(&self, _text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![0.0; 4])
        }
    }

    fn model_name(&self) -> &str {
        "hanging"
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        async move { Err(ProviderError::Unavailable("connection refused".to_string())) }
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        4
    }
}

// ---------------------------------------------------------------------------
// Summarizers
// ---------------------------------------------------------------------------

/// Promotes every message to `msg-<seq>` = content.
pub struct EchoSummarizer;

impl Summarizer for EchoSummarizer {
    fn summarize(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<Option<Promotion>, ProviderError>> + Send {
        let promotion = messages.first().map(|m| Promotion {
            key: format!("msg-{}", m.seq),
            value: m.content.clone(),
        });
        async move { Ok(promotion) }
    }
}

/// Summarizer that always fails.
pub struct FailingSummarizer;

impl Summarizer for FailingSummarizer {
    fn summarize(
        &self,
        _messages: &[Message],
    ) -> impl Future<Output = Result<Option<Promotion>, ProviderError>> + Send {
        async move { Err(ProviderError::InvalidResponse("not json".to_string())) }
    }
}
