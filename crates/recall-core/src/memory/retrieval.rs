//! RetrievalEngine: assembles the per-turn context from short-term recency
//! and long-term semantic matches under a size budget.
//!
//! Pipeline:
//! 1. Recent messages from the short-term log (the only step whose failure
//!    is returned to the caller)
//! 2. Exact-key lookups for explicitly requested keys
//! 3. Semantic matches for the query text when an embedder is configured;
//!    otherwise keyword matches topped up with the most recent facts
//! 4. Duplicate suppression (values already said verbatim, as whole words)
//! 5. Budget truncation: lowest-ranked matches first, then oldest messages
//!
//! Provider or index failures in steps 2-3 degrade the context to
//! short-term only and are logged, never propagated.

use std::sync::Arc;

use recall_types::context::{BudgetUnit, RetrievalContext};
use recall_types::error::MemoryError;
use recall_types::memory::{RankedFact, Scope};
use recall_types::message::Message;
use tracing::{debug, warn};

use super::index::LongTermIndex;
use super::short_term::ShortTermLog;
use crate::repository::fact::FactRepository;
use crate::repository::message::MessageRepository;

/// Input for [`RetrievalEngine::compose_request`].
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    pub session_id: String,
    pub query_text: String,
    pub budget: usize,
    /// Keys to look up exactly (session scope, then global). These are
    /// never dropped by truncation.
    pub explicit_keys: Vec<String>,
}

pub struct RetrievalEngine<M: MessageRepository, F: FactRepository> {
    log: Arc<ShortTermLog<M, F>>,
    index: Arc<LongTermIndex<F>>,
    recent_limit: usize,
    top_k: usize,
    unit: BudgetUnit,
}

impl<M: MessageRepository, F: FactRepository> RetrievalEngine<M, F> {
    pub fn new(
        log: Arc<ShortTermLog<M, F>>,
        index: Arc<LongTermIndex<F>>,
        recent_limit: usize,
        top_k: usize,
        unit: BudgetUnit,
    ) -> Self {
        Self {
            log,
            index,
            recent_limit,
            top_k,
            unit,
        }
    }

    pub async fn compose(
        &self,
        session_id: &str,
        query_text: &str,
        budget: usize,
    ) -> Result<RetrievalContext, MemoryError> {
        self.compose_request(&ComposeRequest {
            session_id: session_id.to_string(),
            query_text: query_text.to_string(),
            budget,
            explicit_keys: Vec::new(),
        })
        .await
    }

    #[tracing::instrument(
        name = "compose_context",
        skip(self, request),
        fields(
            session_id = %request.session_id,
            budget = request.budget,
            explicit_keys = request.explicit_keys.len(),
        )
    )]
    pub async fn compose_request(&self, request: &ComposeRequest) -> Result<RetrievalContext, MemoryError> {
        let session_id = request.session_id.as_str();
        let mut messages = self.log.get_recent(session_id, self.recent_limit).await?;
        let mut degraded = false;

        let mut exact: Vec<RankedFact> = Vec::new();
        for key in &request.explicit_keys {
            if exact.iter().any(|r| r.fact.key == key.trim()) {
                continue;
            }
            match self.index.get_with_fallback(session_id, key).await {
                Ok(fact) => exact.push(RankedFact {
                    fact,
                    score: 1.0,
                    exact: true,
                }),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "exact lookup failed, continuing without it");
                    degraded = true;
                }
            }
        }

        let mut semantic = Vec::new();
        if self.index.has_embedder() && self.top_k > 0 && !request.query_text.trim().is_empty() {
            match self.semantic_matches(session_id, &request.query_text).await {
                Ok(found) => semantic = found,
                Err(e) => {
                    warn!(error = %e, "semantic retrieval failed, using short-term context only");
                    degraded = true;
                }
            }
        } else if !self.index.has_embedder() && self.top_k > 0 {
            match self.keyword_matches(session_id, &request.query_text).await {
                Ok(found) => semantic = found,
                Err(e) => {
                    warn!(error = %e, "keyword retrieval failed, using short-term context only");
                    degraded = true;
                }
            }
        }

        // Duplicate suppression.
        semantic.retain(|candidate| {
            let already_exact = exact
                .iter()
                .any(|r| r.fact.scope == candidate.fact.scope && r.fact.key == candidate.fact.key);
            !already_exact && !appears_verbatim(&candidate.fact.value, &messages)
        });

        let mut facts = exact;
        facts.extend(semantic);

        let mut used = self.total_size(&messages, &facts);
        while used > request.budget {
            if let Some(pos) = facts.iter().rposition(|r| !r.exact) {
                let dropped = facts.remove(pos);
                used -= self.fact_size(&dropped);
            } else if let Some(pos) = messages.iter().position(|m| !m.pinned) {
                let dropped = messages.remove(pos);
                used -= self.unit.measure(&dropped.content);
            } else {
                debug!(used, budget = request.budget, "context over budget with only protected items left");
                break;
            }
        }

        debug!(
            messages = messages.len(),
            facts = facts.len(),
            used,
            degraded,
            "context composed"
        );
        Ok(RetrievalContext {
            messages,
            facts,
            used,
            budget: request.budget,
            unit: self.unit,
            degraded,
        })
    }

    async fn semantic_matches(&self, session_id: &str, query_text: &str) -> Result<Vec<RankedFact>, MemoryError> {
        let embedding = self.index.embed(query_text).await?;
        self.index
            .query(&Scope::session(session_id), &embedding, self.top_k)
            .await
    }

    /// Facts matching the query text, then the most recently updated ones,
    /// up to `top_k`.
    async fn keyword_matches(&self, session_id: &str, query_text: &str) -> Result<Vec<RankedFact>, MemoryError> {
        let scope = Scope::session(session_id);
        let mut found = self.index.keyword_search(&scope, query_text, self.top_k).await?;
        if found.len() < self.top_k {
            for recent in self.index.keyword_search(&scope, "", self.top_k).await? {
                if found.len() == self.top_k {
                    break;
                }
                let seen = found
                    .iter()
                    .any(|r| r.fact.scope == recent.fact.scope && r.fact.key == recent.fact.key);
                if !seen {
                    let score = 1.0 / (found.len() as f32 + 1.0);
                    found.push(RankedFact { score, ..recent });
                }
            }
        }
        Ok(found)
    }

    fn fact_size(&self, ranked: &RankedFact) -> usize {
        self.unit.measure(&ranked.fact.key) + self.unit.measure(&ranked.fact.value)
    }

    fn total_size(&self, messages: &[Message], facts: &[RankedFact]) -> usize {
        let message_size: usize = messages.iter().map(|m| self.unit.measure(&m.content)).sum();
        let fact_size: usize = facts.iter().map(|r| self.fact_size(r)).sum();
        message_size + fact_size
    }
}

/// Whether `value` occurs in some message as a whole word or phrase.
///
/// Case-sensitive; "tea" does not match inside "steak".
fn appears_verbatim(value: &str, messages: &[Message]) -> bool {
    let value = value.trim();
    !value.is_empty() && messages.iter().any(|m| contains_phrase(&m.content, value))
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    // A phrase that starts or ends in punctuation carries its own boundary.
    let open_start = phrase.chars().next().is_some_and(is_word);
    let open_end = phrase.chars().next_back().is_some_and(is_word);
    text.match_indices(phrase).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !(open_start && before.is_some_and(is_word)) && !(open_end && after.is_some_and(is_word))
    })
}
