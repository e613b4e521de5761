//! PruningPolicy: evicts the oldest unpinned messages once a session's
//! short-term log overflows, optionally promoting each one to a
//! session-scoped fact first.
//!
//! Runs only from inside `ShortTermLog::append`, with the session's writer
//! lock held. Promotion is best effort: a missing, refusing, failing, or
//! slow summarizer never blocks eviction. Facts are never deleted here.

use std::sync::Arc;
use std::time::Duration;

use recall_types::error::MemoryError;
use recall_types::memory::{Scope, UpsertOutcome};
use recall_types::message::Message;
use serde::Serialize;
use tracing::{debug, warn};

use super::index::LongTermIndex;
use super::retry::RetryPolicy;
use super::summarizer::BoxSummarizer;
use crate::repository::fact::FactRepository;
use crate::repository::message::MessageRepository;

/// What a pruning pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Sequence numbers of evicted messages, oldest first.
    pub evicted: Vec<u64>,
    /// Keys of facts promoted from evicted messages.
    pub promoted: Vec<String>,
    /// The cap is still exceeded because only pinned messages remain in excess.
    pub pinned_overflow: bool,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && !self.pinned_overflow
    }
}

pub struct PruningPolicy<M: MessageRepository, F: FactRepository> {
    messages: Arc<M>,
    index: Arc<LongTermIndex<F>>,
    summarizer: Option<Arc<BoxSummarizer>>,
    summarize_timeout: Duration,
    retry: RetryPolicy,
}

impl<M: MessageRepository, F: FactRepository> PruningPolicy<M, F> {
    pub fn new(
        messages: Arc<M>,
        index: Arc<LongTermIndex<F>>,
        summarizer: Option<Arc<BoxSummarizer>>,
        summarize_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            messages,
            index,
            summarizer,
            summarize_timeout,
            retry,
        }
    }

    /// Evict until `count <= max_messages` or only pinned messages remain.
    ///
    /// `count` is the session's message count after the triggering append.
    /// The caller must hold the session's writer lock.
    pub async fn enforce(
        &self,
        session_id: &str,
        max_messages: usize,
        count: u64,
    ) -> Result<PruneReport, MemoryError> {
        let mut report = PruneReport::default();
        let excess = count.saturating_sub(max_messages as u64) as usize;
        if excess == 0 {
            return Ok(report);
        }

        let repo = &*self.messages;
        let victims = self
            .retry
            .run("oldest_unpinned", move || repo.oldest_unpinned(session_id, excess))
            .await?;

        for message in &victims {
            if let Some(key) = self.promote(message).await {
                report.promoted.push(key);
            }
            let seq = message.seq;
            let removed = self
                .retry
                .run("delete_message", move || repo.delete_message(session_id, seq))
                .await?;
            if removed {
                report.evicted.push(seq);
            }
        }

        if victims.len() < excess {
            report.pinned_overflow = true;
            debug!(
                session_id,
                max_messages,
                remaining_excess = excess - victims.len(),
                "short-term cap exceeded by pinned messages"
            );
        }

        debug!(
            session_id,
            evicted = report.evicted.len(),
            promoted = report.promoted.len(),
            "pruned short-term log"
        );
        Ok(report)
    }

    /// Offer `message` to the summarizer and store any proposed fact.
    ///
    /// Returns the promoted key. Every failure is logged and swallowed.
    async fn promote(&self, message: &Message) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;

        let promotion = match tokio::time::timeout(
            self.summarize_timeout,
            summarizer.summarize(std::slice::from_ref(message)),
        )
        .await
        {
            Ok(Ok(Some(promotion))) => promotion,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(session_id = %message.session_id, seq = message.seq, error = %e, "summarizer failed, evicting without promotion");
                return None;
            }
            Err(_) => {
                warn!(
                    session_id = %message.session_id,
                    seq = message.seq,
                    timeout_ms = self.summarize_timeout.as_millis() as u64,
                    "summarizer timed out, evicting without promotion"
                );
                return None;
            }
        };

        let scope = Scope::session(message.session_id.clone());
        match self
            .index
            .write_fact(&scope, &promotion.key, &promotion.value)
            .await
        {
            Ok(UpsertOutcome::Applied(fact)) => {
                debug!(key = %fact.key, seq = message.seq, "promoted evicted message");
                Some(fact.key)
            }
            Ok(UpsertOutcome::Superseded { .. }) => None,
            Err(e) => {
                warn!(key = %promotion.key, seq = message.seq, error = %e, "promotion write failed");
                None
            }
        }
    }
}
