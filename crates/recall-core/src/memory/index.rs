//! LongTermIndex: durable key/value facts with semantic lookup.
//!
//! Writes embed the value first, then take a write timestamp and commit under
//! last-write-wins. Reads never take a lock. Session-scoped writes hold the
//! session's writer lock; global writes race freely and resolve by
//! `write_ts`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use recall_types::error::{MemoryError, ProviderError, RepositoryError};
use recall_types::memory::{Fact, RankedFact, Scope, UpsertOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::box_embedder::BoxEmbedder;
use super::clock::WriteClock;
use super::locks::SessionLocks;
use super::retry::RetryPolicy;
use super::vector::rank_facts;
use crate::repository::fact::FactRepository;

/// `embedding_model` recorded for facts written while no embedder was
/// configured. Such facts are reachable by key and keyword search until
/// `reindex`.
pub const UNEMBEDDED_MODEL: &str = "none";

/// Outcome of a `reindex` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub reembedded: usize,
    pub superseded: usize,
    pub failed: usize,
}

pub struct LongTermIndex<F: FactRepository> {
    repo: Arc<F>,
    embedder: Option<Arc<BoxEmbedder>>,
    locks: Arc<SessionLocks>,
    clock: WriteClock,
    retry: RetryPolicy,
    embedding_timeout: Duration,
}

impl<F: FactRepository> LongTermIndex<F> {
    pub fn new(
        repo: Arc<F>,
        embedder: Option<Arc<BoxEmbedder>>,
        locks: Arc<SessionLocks>,
        retry: RetryPolicy,
        embedding_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            embedder,
            locks,
            clock: WriteClock::new(),
            retry,
            embedding_timeout,
        }
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Embed `text` with the configured provider under the embedding timeout.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            ProviderError::Unavailable("no embedding provider configured".to_string())
        })?;
        embedder.embed_within(text, self.embedding_timeout).await
    }

    /// Insert or replace the fact at `(scope, key)`.
    ///
    /// Fails with `Provider` when embedding fails (nothing is written) and
    /// `InvalidInput` for an empty key. Returns `Superseded` when a later
    /// write to the same key had already been committed.
    #[tracing::instrument(name = "fact_upsert", skip(self, value), fields(scope = %scope))]
    pub async fn upsert(&self, scope: &Scope, key: &str, value: &str) -> Result<UpsertOutcome, MemoryError> {
        let _guard = match scope.session_id() {
            Some(session_id) => Some(self.locks.acquire(session_id).await),
            None => None,
        };
        self.write_fact(scope, key, value).await
    }

    /// Upsert without taking the session lock.
    ///
    /// Callers must already hold the writer lock for session scopes
    /// (pruning promotes facts from inside `append`).
    pub(crate) async fn write_fact(
        &self,
        scope: &Scope,
        key: &str,
        value: &str,
    ) -> Result<UpsertOutcome, MemoryError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(MemoryError::InvalidInput("fact key must not be empty".to_string()));
        }

        let (embedding, embedding_model) = match &self.embedder {
            Some(embedder) => (
                embedder.embed_within(value, self.embedding_timeout).await?,
                embedder.model_name().to_string(),
            ),
            None => (Vec::new(), UNEMBEDDED_MODEL.to_string()),
        };

        // Timestamp after embedding: commit order follows write_ts order.
        let now = Utc::now();
        let fact = Fact {
            scope: scope.clone(),
            key: key.to_string(),
            value: value.to_string(),
            embedding,
            embedding_model,
            created_at: now,
            updated_at: now,
            write_ts: self.clock.next(),
        };
        self.commit_lww(fact).await
    }

    /// Commit under last-write-wins, re-reading once on a backend conflict.
    async fn commit_lww(&self, mut fact: Fact) -> Result<UpsertOutcome, MemoryError> {
        match self.commit(&fact).await {
            Err(RepositoryError::Conflict(reason)) => {
                warn!(key = %fact.key, %reason, "write conflict, re-reading and reapplying");
                if let Some(current) = self.fetch(&fact.scope, &fact.key).await? {
                    self.clock.observe(current.write_ts);
                }
                fact.write_ts = self.clock.next();
                match self.commit(&fact).await {
                    Err(RepositoryError::Conflict(reason)) => Err(MemoryError::Conflict(format!(
                        "'{}' in {}: {reason}",
                        fact.key, fact.scope
                    ))),
                    other => self.settle(other?, &fact).await,
                }
            }
            other => self.settle(other?, &fact).await,
        }
    }

    async fn settle(&self, outcome: UpsertOutcome, fact: &Fact) -> Result<UpsertOutcome, MemoryError> {
        match outcome {
            UpsertOutcome::Applied(stored) => {
                debug!(key = %stored.key, scope = %stored.scope, write_ts = stored.write_ts, "fact written");
                Ok(UpsertOutcome::Applied(stored))
            }
            // Our own earlier attempt committed before a retry observed it.
            UpsertOutcome::Superseded { current_write_ts } if current_write_ts == fact.write_ts => {
                match self.fetch(&fact.scope, &fact.key).await? {
                    Some(stored) => Ok(UpsertOutcome::Applied(stored)),
                    None => Ok(UpsertOutcome::Applied(fact.clone())),
                }
            }
            UpsertOutcome::Superseded { current_write_ts } => {
                self.clock.observe(current_write_ts);
                debug!(
                    key = %fact.key,
                    ours = fact.write_ts,
                    current = current_write_ts,
                    "write superseded by a later one"
                );
                Ok(UpsertOutcome::Superseded { current_write_ts })
            }
        }
    }

    async fn commit(&self, fact: &Fact) -> Result<UpsertOutcome, RepositoryError> {
        let repo = &*self.repo;
        self.retry
            .run("upsert_fact", move || repo.upsert_fact(fact))
            .await
    }

    async fn fetch(&self, scope: &Scope, key: &str) -> Result<Option<Fact>, MemoryError> {
        let repo = &*self.repo;
        Ok(self.retry.run("get_fact", move || repo.get_fact(scope, key)).await?)
    }

    /// Exact-key lookup; never touches the embedder.
    pub async fn get(&self, scope: &Scope, key: &str) -> Result<Fact, MemoryError> {
        self.fetch(scope, key.trim())
            .await?
            .ok_or_else(|| MemoryError::key_not_found(key))
    }

    /// Exact-key lookup in the session scope, then in global.
    pub async fn get_with_fallback(&self, session_id: &str, key: &str) -> Result<Fact, MemoryError> {
        for scope in Scope::session(session_id).visible() {
            if let Some(fact) = self.fetch(&scope, key.trim()).await? {
                return Ok(fact);
            }
        }
        Err(MemoryError::key_not_found(key))
    }

    /// Remove a fact. Returns whether anything was removed.
    #[tracing::instrument(name = "fact_delete", skip(self), fields(scope = %scope))]
    pub async fn delete(&self, scope: &Scope, key: &str) -> Result<bool, MemoryError> {
        let _guard = match scope.session_id() {
            Some(session_id) => Some(self.locks.acquire(session_id).await),
            None => None,
        };
        let repo = &*self.repo;
        let key = key.trim();
        let removed = self
            .retry
            .run("delete_fact", move || repo.delete_fact(scope, key))
            .await?;
        debug!(key, removed, "fact delete");
        Ok(removed)
    }

    /// Top `top_k` facts visible from `scope` by cosine similarity.
    ///
    /// Ties order by newer `updated_at`, then by key. `top_k == 0` returns
    /// an empty list without touching storage.
    pub async fn query(
        &self,
        scope: &Scope,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RankedFact>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let repo = &*self.repo;
        let scopes = scope.visible();
        let scopes = scopes.as_slice();
        let candidates: Vec<Fact> = self
            .retry
            .run("facts_in_scopes", move || repo.facts_in_scopes(scopes))
            .await?
            .into_iter()
            .filter(|f| !f.embedding.is_empty())
            .collect();

        let (ranked, skipped) = rank_facts(candidates, query_embedding, top_k);
        if skipped > 0 {
            warn!(
                skipped,
                dimension = query_embedding.len(),
                "facts with a foreign embedding dimension skipped; run reindex"
            );
        }
        Ok(ranked)
    }

    /// Embed `text` and run [`query`](Self::query).
    ///
    /// Without an embedder this falls back to
    /// [`keyword_search`](Self::keyword_search).
    pub async fn search(&self, scope: &Scope, text: &str, top_k: usize) -> Result<Vec<RankedFact>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if self.embedder.is_none() {
            return self.keyword_search(scope, text, top_k).await;
        }
        let embedding = self.embed(text).await?;
        self.query(scope, &embedding, top_k).await
    }

    /// Facts visible from `scope` whose key or value contains `text`,
    /// most recently updated first.
    ///
    /// Scores are reciprocal ranks (1, 1/2, 1/3...). An empty `text` returns
    /// the most recently updated facts.
    pub async fn keyword_search(
        &self,
        scope: &Scope,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<RankedFact>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let repo = &*self.repo;
        let scopes = scope.visible();
        let scopes = scopes.as_slice();
        let needle = text.trim();
        let found = self
            .retry
            .run("search_keyword", move || repo.search_keyword(scopes, needle, top_k))
            .await?;
        Ok(found
            .into_iter()
            .enumerate()
            .map(|(rank, fact)| RankedFact {
                fact,
                score: 1.0 / (rank as f32 + 1.0),
                exact: false,
            })
            .collect())
    }

    /// Facts stored in exactly `scope`, ordered by key.
    pub async fn list(&self, scope: &Scope) -> Result<Vec<Fact>, MemoryError> {
        let repo = &*self.repo;
        let scopes = std::slice::from_ref(scope);
        let mut facts = self
            .retry
            .run("facts_in_scopes", move || repo.facts_in_scopes(scopes))
            .await?;
        facts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(facts)
    }

    pub async fn count(&self) -> Result<u64, MemoryError> {
        let repo = &*self.repo;
        Ok(self.retry.run("count_facts", move || repo.count_facts()).await?)
    }

    /// Re-embed every fact produced by a model other than the configured one.
    ///
    /// Only the embedding is replaced, and only while the fact still carries
    /// the `write_ts` it was read with; a fact rewritten mid-pass counts as
    /// superseded and keeps the newer write. Per-fact provider failures are
    /// counted and skipped; storage failures abort the pass.
    #[tracing::instrument(name = "fact_reindex", skip(self))]
    pub async fn reindex(&self) -> Result<ReindexReport, MemoryError> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            MemoryError::InvalidInput("reindex requires an embedding provider".to_string())
        })?;
        let model = embedder.model_name().to_string();

        let repo = &*self.repo;
        let model_ref = model.as_str();
        let stale = self
            .retry
            .run("facts_needing_reembed", move || repo.facts_needing_reembed(model_ref))
            .await?;
        info!(count = stale.len(), model = %model, "re-embedding facts");

        let mut report = ReindexReport::default();
        for fact in stale {
            let _guard = match fact.scope.session_id() {
                Some(session_id) => Some(self.locks.acquire(session_id).await),
                None => None,
            };
            let embedding = match embedder.embed_within(&fact.value, self.embedding_timeout).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(key = %fact.key, scope = %fact.scope, error = %e, "re-embedding failed");
                    report.failed += 1;
                    continue;
                }
            };
            let (scope, key, write_ts) = (&fact.scope, fact.key.as_str(), fact.write_ts);
            let embedding = embedding.as_slice();
            let replaced = self
                .retry
                .run("replace_embedding", move || {
                    repo.replace_embedding(scope, key, write_ts, embedding, model_ref)
                })
                .await?;
            if replaced {
                report.reembedded += 1;
            } else {
                debug!(key = %fact.key, scope = %fact.scope, "fact changed during reindex, keeping the newer write");
                report.superseded += 1;
            }
        }
        info!(?report, "reindex complete");
        Ok(report)
    }
}
