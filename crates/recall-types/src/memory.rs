//! Long-term memory types for Recall.
//!
//! These types model durable, key-addressed facts with an attached embedding
//! for semantic lookup. Facts live either in a single session's namespace or
//! in the global namespace shared by every session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Namespace a fact belongs to.
///
/// Stored as `"global"` or `"session:<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "session_id")]
pub enum Scope {
    Global,
    Session(String),
}

impl Scope {
    pub fn session(id: impl Into<String>) -> Self {
        Scope::Session(id.into())
    }

    /// Session id for session-local scopes.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Session(id) => Some(id),
        }
    }

    /// Scopes visible from this scope: a session scope always includes global.
    pub fn visible(&self) -> Vec<Scope> {
        match self {
            Scope::Global => vec![Scope::Global],
            Scope::Session(_) => vec![self.clone(), Scope::Global],
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Session(id) => write!(f, "session:{id}"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Scope::Global);
        }
        match s.strip_prefix("session:") {
            Some(id) if !id.is_empty() => Ok(Scope::Session(id.to_string())),
            _ => Err(format!("invalid fact scope: '{s}'")),
        }
    }
}

/// A durable key/value fact with its embedding.
///
/// `(scope, key)` identifies at most one fact. Writing an existing pair
/// replaces `value`, `embedding`, `embedding_model`, `updated_at`, and
/// `write_ts`; `created_at` is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub scope: Scope,
    pub key: String,
    pub value: String,
    pub embedding: Vec<f32>,
    /// Name of the embedding model that produced `embedding`.
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic write timestamp (microseconds) used for last-write-wins.
    pub write_ts: i64,
}

/// A fact selected for a retrieval context together with its ranking score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFact {
    pub fact: Fact,
    /// Cosine similarity to the query, or 1.0 for exact-key lookups.
    pub score: f32,
    /// Requested explicitly by key; never dropped by budget truncation.
    pub exact: bool,
}

/// A fact proposed by the summarizer for a message about to be evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub key: String,
    pub value: String,
}

/// Result of a fact write under last-write-wins.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The write was committed; the stored fact is returned.
    Applied(Fact),
    /// A write with a later timestamp was already committed; this one was dropped.
    Superseded { current_write_ts: i64 },
}

impl UpsertOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpsertOutcome::Applied(_))
    }
}
