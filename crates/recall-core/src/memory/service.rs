//! MemoryService: the explicitly constructed facade over the memory
//! components.
//!
//! Owns the wiring (shared session locks, retry policy, capabilities) so
//! that callers deal with one object opened at start and dropped at stop.

use std::sync::Arc;

use chrono::Utc;
use recall_types::config::MemoryConfig;
use recall_types::context::RetrievalContext;
use recall_types::error::MemoryError;
use recall_types::memory::{Fact, RankedFact, Scope, UpsertOutcome};
use recall_types::message::{Message, Role};
use recall_types::session::{Session, SessionState};
use tracing::info;

use super::box_embedder::BoxEmbedder;
use super::index::{LongTermIndex, ReindexReport};
use super::locks::SessionLocks;
use super::pruning::PruningPolicy;
use super::retrieval::{ComposeRequest, RetrievalEngine};
use super::retry::RetryPolicy;
use super::session_store::SessionStore;
use super::short_term::{AppendOutcome, ShortTermLog};
use super::summarizer::BoxSummarizer;
use crate::repository::fact::FactRepository;
use crate::repository::message::MessageRepository;
use crate::repository::session::SessionRepository;

pub struct MemoryService<S, M, F>
where
    S: SessionRepository,
    M: MessageRepository,
    F: FactRepository,
{
    config: MemoryConfig,
    sessions: SessionStore<S>,
    log: Arc<ShortTermLog<M, F>>,
    index: Arc<LongTermIndex<F>>,
    retrieval: RetrievalEngine<M, F>,
}

impl<S, M, F> MemoryService<S, M, F>
where
    S: SessionRepository,
    M: MessageRepository,
    F: FactRepository,
{
    /// Wire the components.
    ///
    /// Fails with `InvalidInput` for an invalid config or when the embedder
    /// is not the model named by `embedding_model`.
    pub fn new(
        config: MemoryConfig,
        session_repo: Arc<S>,
        message_repo: Arc<M>,
        fact_repo: Arc<F>,
        embedder: Option<BoxEmbedder>,
        summarizer: Option<BoxSummarizer>,
    ) -> Result<Self, MemoryError> {
        config.validate()?;

        if let Some(embedder) = &embedder {
            if embedder.model_name() != config.embedding_model.trim() {
                return Err(MemoryError::InvalidInput(format!(
                    "embedder produces '{}' vectors but embedding_model is '{}'",
                    embedder.model_name(),
                    config.embedding_model
                )));
            }
        }

        let retry = RetryPolicy::new(config.retry.clone(), config.storage_timeout());
        let locks = Arc::new(SessionLocks::new());

        let index = Arc::new(LongTermIndex::new(
            fact_repo,
            embedder.map(Arc::new),
            Arc::clone(&locks),
            retry.clone(),
            config.embedding_timeout(),
        ));
        let pruning = PruningPolicy::new(
            Arc::clone(&message_repo),
            Arc::clone(&index),
            summarizer.map(Arc::new),
            config.embedding_timeout(),
            retry.clone(),
        );
        let log = Arc::new(ShortTermLog::new(
            message_repo,
            pruning,
            locks,
            config.max_messages,
            retry.clone(),
        ));
        let retrieval = RetrievalEngine::new(
            Arc::clone(&log),
            Arc::clone(&index),
            config.recent_limit,
            config.retrieval_top_k,
            config.budget_unit,
        );
        let sessions = SessionStore::new(session_repo, config.idle_timeout(), retry);

        info!(
            max_messages = config.max_messages,
            embedding_model = %config.embedding_model,
            semantic = index.has_embedder(),
            "memory service ready"
        );

        Ok(Self {
            config,
            sessions,
            log,
            index,
            retrieval,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // -- sessions ------------------------------------------------------------

    pub async fn open_session(&self, id: &str, platform: &str, user: &str) -> Result<Session, MemoryError> {
        self.sessions.get_or_create(id, platform, user).await
    }

    pub async fn touch(&self, id: &str) -> Result<(), MemoryError> {
        self.sessions.touch(id).await
    }

    pub async fn session(&self, id: &str) -> Result<Session, MemoryError> {
        self.sessions.get(id).await
    }

    pub async fn sessions(&self) -> Result<Vec<Session>, MemoryError> {
        self.sessions.list().await
    }

    pub async fn session_state(&self, id: &str) -> Result<SessionState, MemoryError> {
        let session = self.sessions.get(id).await?;
        let has_messages = self.log.count(id).await? > 0;
        Ok(self.sessions.state(&session, has_messages, Utc::now()))
    }

    // -- short-term ----------------------------------------------------------

    /// Inbound message path: create the session if needed, touch it, append.
    #[tracing::instrument(name = "record_message", skip(self, content), fields(session_id = %session_id, role = %role))]
    pub async fn record_message(
        &self,
        session_id: &str,
        platform: &str,
        user: &str,
        role: Role,
        content: &str,
        pinned: bool,
    ) -> Result<AppendOutcome, MemoryError> {
        self.sessions.get_or_create(session_id, platform, user).await?;
        self.sessions.touch(session_id).await?;
        self.log.append(session_id, role, content, pinned).await
    }

    /// Append to an existing session.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        pinned: bool,
    ) -> Result<AppendOutcome, MemoryError> {
        self.sessions.touch(session_id).await?;
        self.log.append(session_id, role, content, pinned).await
    }

    /// Recent messages, oldest first; `None` uses the configured limit.
    pub async fn get_recent(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>, MemoryError> {
        self.log
            .get_recent(session_id, limit.unwrap_or(self.config.recent_limit))
            .await
    }

    pub async fn count_messages(&self, session_id: &str) -> Result<u64, MemoryError> {
        self.log.count(session_id).await
    }

    // -- long-term -----------------------------------------------------------

    pub async fn remember(&self, scope: &Scope, key: &str, value: &str) -> Result<UpsertOutcome, MemoryError> {
        self.index.upsert(scope, key, value).await
    }

    pub async fn forget(&self, scope: &Scope, key: &str) -> Result<bool, MemoryError> {
        self.index.delete(scope, key).await
    }

    pub async fn get_fact(&self, scope: &Scope, key: &str) -> Result<Fact, MemoryError> {
        self.index.get(scope, key).await
    }

    /// Exact lookup in the session scope, falling back to global.
    pub async fn lookup(&self, session_id: &str, key: &str) -> Result<Fact, MemoryError> {
        self.index.get_with_fallback(session_id, key).await
    }

    pub async fn query(
        &self,
        scope: &Scope,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RankedFact>, MemoryError> {
        self.index.query(scope, query_embedding, top_k).await
    }

    /// Semantic search by text; `None` uses the configured `retrieval_top_k`.
    pub async fn search(&self, scope: &Scope, text: &str, top_k: Option<usize>) -> Result<Vec<RankedFact>, MemoryError> {
        self.index
            .search(scope, text, top_k.unwrap_or(self.config.retrieval_top_k))
            .await
    }

    pub async fn list_facts(&self, scope: &Scope) -> Result<Vec<Fact>, MemoryError> {
        self.index.list(scope).await
    }

    pub async fn count_facts(&self) -> Result<u64, MemoryError> {
        self.index.count().await
    }

    pub async fn reindex(&self) -> Result<ReindexReport, MemoryError> {
        self.index.reindex().await
    }

    // -- retrieval -----------------------------------------------------------

    /// Compose a turn context; `None` uses the configured budget.
    pub async fn compose(
        &self,
        session_id: &str,
        query_text: &str,
        budget: Option<usize>,
    ) -> Result<RetrievalContext, MemoryError> {
        self.retrieval
            .compose(session_id, query_text, budget.unwrap_or(self.config.context_budget))
            .await
    }

    pub async fn compose_request(&self, request: &ComposeRequest) -> Result<RetrievalContext, MemoryError> {
        self.retrieval.compose_request(request).await
    }
}
