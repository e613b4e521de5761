//! Retrieval context handed to the agent for a single turn.
//!
//! A `RetrievalContext` is ephemeral: it is assembled by the retrieval engine
//! from the short-term log and the long-term index and never persisted.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::memory::RankedFact;
use crate::message::Message;

/// Unit in which a context budget is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    /// Unicode scalar values.
    Chars,
    /// Approximate tokens: one token per four characters, rounded up.
    #[default]
    Tokens,
}

impl BudgetUnit {
    /// Size of `text` in this unit.
    pub fn measure(&self, text: &str) -> usize {
        let chars = text.chars().count();
        match self {
            BudgetUnit::Chars => chars,
            BudgetUnit::Tokens => chars.div_ceil(4),
        }
    }
}

impl fmt::Display for BudgetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetUnit::Chars => write!(f, "chars"),
            BudgetUnit::Tokens => write!(f, "tokens"),
        }
    }
}

impl FromStr for BudgetUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" => Ok(BudgetUnit::Chars),
            "tokens" => Ok(BudgetUnit::Tokens),
            other => Err(format!("invalid budget unit: '{other}'")),
        }
    }
}

/// Recent messages plus relevant facts selected for one agent turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Selected short-term messages, oldest first.
    pub messages: Vec<Message>,
    /// Selected long-term facts, best ranked first.
    pub facts: Vec<RankedFact>,
    /// Size of the selected content in `unit`.
    pub used: usize,
    pub budget: usize,
    pub unit: BudgetUnit,
    /// Semantic retrieval was skipped because the embedding provider failed.
    pub degraded: bool,
}

impl RetrievalContext {
    pub fn is_over_budget(&self) -> bool {
        self.used > self.budget
    }

    /// Render the selected facts as a system preamble for the agent prompt.
    ///
    /// Returns `None` when no facts were selected.
    pub fn render_preamble(&self) -> Option<String> {
        if self.facts.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .facts
            .iter()
            .map(|ranked| format!("- {}: {}", ranked.fact.key, ranked.fact.value))
            .collect();
        Some(format!("Key information about the user:\n{}", lines.join("\n")))
    }
}
