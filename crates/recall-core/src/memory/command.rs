//! User-facing `memory` command surface.
//!
//! Parses `/memory <op> ...` chat text (or the same words from the CLI) and
//! executes it against a [`MemoryService`] in the caller's session scope.
//! Replies are plain text; a missing key is reported as not found, never as
//! an internal error.

use std::fmt::Write as _;

use recall_types::error::MemoryError;
use recall_types::memory::{RankedFact, Scope, UpsertOutcome};
use tracing::warn;

use super::service::MemoryService;
use crate::repository::fact::FactRepository;
use crate::repository::message::MessageRepository;
use crate::repository::session::SessionRepository;

/// Values longer than this are cut in search listings.
const PREVIEW_CHARS: usize = 100;

const USAGE: &str = "Usage: memory set <key> <value> | get <key> | delete <key> | search <query> | list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryCommand {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    Search { query: String },
    List,
}

impl MemoryCommand {
    /// Parse `"/memory set name Alice"`, `"memory get name"` or `"list"`.
    pub fn parse(input: &str) -> Result<Self, MemoryError> {
        let mut rest = input.trim();
        for prefix in ["/memory", "memory"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                if stripped.is_empty() || stripped.starts_with(char::is_whitespace) {
                    rest = stripped.trim_start();
                    break;
                }
            }
        }

        let (op, args) = split_word(rest);
        let invalid = || MemoryError::InvalidInput(USAGE.to_string());
        match op.to_lowercase().as_str() {
            "set" | "remember" => {
                let (key, value) = split_word(args);
                if key.is_empty() || value.is_empty() {
                    return Err(invalid());
                }
                Ok(MemoryCommand::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            "get" => required(args).map(|key| MemoryCommand::Get { key }).ok_or_else(invalid),
            "delete" | "forget" => required(args)
                .map(|key| MemoryCommand::Delete { key })
                .ok_or_else(invalid),
            "search" => required(args)
                .map(|query| MemoryCommand::Search { query })
                .ok_or_else(invalid),
            "list" => Ok(MemoryCommand::List),
            _ => Err(invalid()),
        }
    }

    /// Run the command in `session_id`'s scope and render a reply.
    ///
    /// Provider and storage failures on writes are returned as errors;
    /// lookups that find nothing produce a "not found" reply.
    pub async fn execute<S, M, F>(
        &self,
        service: &MemoryService<S, M, F>,
        session_id: &str,
    ) -> Result<String, MemoryError>
    where
        S: SessionRepository,
        M: MessageRepository,
        F: FactRepository,
    {
        let scope = Scope::session(session_id);
        match self {
            MemoryCommand::Set { key, value } => match service.remember(&scope, key, value).await? {
                UpsertOutcome::Applied(_) => Ok(format!("Remembered '{key}'.")),
                UpsertOutcome::Superseded { .. } => {
                    Ok(format!("A newer value for '{key}' was saved at the same time; kept that one."))
                }
            },
            MemoryCommand::Get { key } => match service.lookup(session_id, key).await {
                Ok(fact) => Ok(format!("{}: {}", fact.key, fact.value)),
                Err(e) if e.is_not_found() => {
                    let matches = match service.search(&scope, key, Some(3)).await {
                        Ok(matches) => matches,
                        Err(e) => {
                            warn!(key = %key, error = %e, "semantic fallback for memory get failed");
                            Vec::new()
                        }
                    };
                    let matches: Vec<RankedFact> = matches.into_iter().filter(|r| r.score > 0.0).collect();
                    if matches.is_empty() {
                        Ok(format!("'{key}' not found."))
                    } else {
                        Ok(format!(
                            "No exact match for '{key}'. Closest memories:\n{}",
                            render_list(&matches)
                        ))
                    }
                }
                Err(e) => Err(e),
            },
            MemoryCommand::Delete { key } => {
                if service.forget(&scope, key).await? {
                    Ok(format!("Forgot '{key}'."))
                } else {
                    Ok(format!("'{key}' not found."))
                }
            }
            MemoryCommand::Search { query } => {
                let matches = service.search(&scope, query, None).await?;
                if matches.is_empty() {
                    Ok("No memories found.".to_string())
                } else {
                    Ok(render_list(&matches))
                }
            }
            MemoryCommand::List => {
                let facts = service.list_facts(&scope).await?;
                if facts.is_empty() {
                    return Ok("No memories stored for this session.".to_string());
                }
                let mut out = String::new();
                for fact in &facts {
                    let _ = writeln!(out, "- {}: {}", fact.key, fact.value);
                }
                Ok(out.trim_end().to_string())
            }
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim()),
        None => (s, ""),
    }
}

fn required(args: &str) -> Option<String> {
    let args = args.trim();
    (!args.is_empty()).then(|| args.to_string())
}

fn render_list(matches: &[RankedFact]) -> String {
    matches
        .iter()
        .map(|r| format!("- {}: {}", r.fact.key, preview(&r.fact.value)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(value: &str) -> String {
    if value.chars().count() <= PREVIEW_CHARS {
        value.to_string()
    } else {
        let cut: String = value.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}
