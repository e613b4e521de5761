//! Long-term memory CLI subcommands.
//!
//! `set`, `get`, `delete`, `search` and `list` work on the session scope by
//! default and on the global scope with `--global`. `exec` runs a chat-style
//! `/memory ...` line exactly as an agent would.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use recall_core::memory::command::MemoryCommand;
use recall_types::memory::{Scope, UpsertOutcome};

use super::preview;
use crate::state::AppState;

#[derive(Args, Debug, Clone, Copy)]
pub struct ScopeArgs {
    /// Use the global scope shared by every session.
    #[arg(long)]
    pub global: bool,
}

impl ScopeArgs {
    fn resolve(self, session: &str) -> Scope {
        if self.global {
            Scope::Global
        } else {
            Scope::session(session)
        }
    }
}

#[derive(Subcommand)]
pub enum MemoryCliCommand {
    /// Store or replace a fact.
    Set {
        /// Session id.
        session: String,
        key: String,
        value: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Look up a fact by key (session scope falls back to global).
    Get {
        session: String,
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Delete a fact.
    #[command(alias = "rm")]
    Delete {
        session: String,
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Semantic search over visible facts.
    Search {
        session: String,
        query: String,
        /// Number of matches (defaults to `retrieval_top_k`).
        #[arg(short = 'n', long)]
        top_k: Option<usize>,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// List facts visible from the scope.
    #[command(alias = "ls")]
    List {
        session: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Run a `/memory <op> ...` line in the session scope.
    Exec {
        session: String,
        /// Command words, e.g. `set name Alice`.
        #[arg(trailing_var_arg = true, required = true)]
        line: Vec<String>,
    },
}

/// Handle a memory subcommand.
pub async fn handle_memory_command(cmd: MemoryCliCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        MemoryCliCommand::Set {
            session,
            key,
            value,
            scope,
        } => set(state, &scope.resolve(&session), &key, &value, json).await,
        MemoryCliCommand::Get {
            session,
            key,
            scope,
        } => get(state, &session, scope, &key, json).await,
        MemoryCliCommand::Delete {
            session,
            key,
            scope,
        } => delete(state, &scope.resolve(&session), &key, json).await,
        MemoryCliCommand::Search {
            session,
            query,
            top_k,
            scope,
        } => search(state, &scope.resolve(&session), &query, top_k, json).await,
        MemoryCliCommand::List { session, scope } => list(state, &scope.resolve(&session), json).await,
        MemoryCliCommand::Exec { session, line } => exec(state, &session, &line.join(" "), json).await,
    }
}

async fn set(state: &AppState, scope: &Scope, key: &str, value: &str, json: bool) -> Result<()> {
    let outcome = state.memory.remember(scope, key, value).await?;
    let applied = outcome.is_applied();

    if json {
        let result = serde_json::json!({
            "scope": scope.to_string(),
            "key": key,
            "applied": applied,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    match outcome {
        UpsertOutcome::Applied(fact) => {
            let note = if fact.embedding.is_empty() {
                " (key lookup only)"
            } else {
                ""
            };
            println!(
                "  {} Remembered '{}' in {}{}",
                style("ok").green(),
                style(key).cyan(),
                style(scope).cyan(),
                note,
            );
        }
        UpsertOutcome::Superseded { .. } => {
            println!(
                "  {} A newer write to '{}' won; this value was dropped",
                style("i").blue().bold(),
                style(key).cyan(),
            );
        }
    }
    println!();
    Ok(())
}

async fn get(state: &AppState, session: &str, scope: ScopeArgs, key: &str, json: bool) -> Result<()> {
    let found = if scope.global {
        state.memory.get_fact(&Scope::Global, key).await
    } else {
        state.memory.lookup(session, key).await
    };
    let fact = match found {
        Ok(fact) => Some(fact),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    if json {
        let result = serde_json::json!({
            "key": key,
            "fact": fact,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    match fact {
        Some(fact) => println!(
            "  {} = {}  {}",
            style(&fact.key).cyan().bold(),
            fact.value,
            style(format!("[{}]", fact.scope)).dim(),
        ),
        None => println!(
            "  {} Key '{}' not found",
            style("i").blue().bold(),
            style(key).cyan(),
        ),
    }
    println!();
    Ok(())
}

async fn delete(state: &AppState, scope: &Scope, key: &str, json: bool) -> Result<()> {
    let deleted = state.memory.forget(scope, key).await?;

    if json {
        let result = serde_json::json!({
            "scope": scope.to_string(),
            "key": key,
            "deleted": deleted,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    if deleted {
        println!(
            "  {} Deleted '{}' from {}",
            style("ok").green(),
            style(key).cyan(),
            style(scope).cyan(),
        );
    } else {
        println!(
            "  {} Key '{}' not found in {}",
            style("i").blue().bold(),
            style(key).cyan(),
            style(scope).cyan(),
        );
    }
    println!();
    Ok(())
}

async fn search(state: &AppState, scope: &Scope, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let matches = state.memory.search(scope, query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!();
        println!("  {} No memories found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = fact_table(&["Score", "Key", "Value", "Scope"]);
    for ranked in &matches {
        table.add_row(vec![
            Cell::new(format!("{:.3}", ranked.score)),
            Cell::new(&ranked.fact.key).fg(Color::Cyan),
            Cell::new(preview(&ranked.fact.value, 60)),
            Cell::new(ranked.fact.scope.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn list(state: &AppState, scope: &Scope, json: bool) -> Result<()> {
    let facts = state.memory.list_facts(scope).await?;

    if json {
        let result = serde_json::json!({
            "scope": scope.to_string(),
            "count": facts.len(),
            "facts": facts,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if facts.is_empty() {
        println!();
        println!(
            "  {} No memories visible from {}.",
            style("i").blue().bold(),
            style(scope).cyan(),
        );
        println!();
        return Ok(());
    }

    let mut table = fact_table(&["Key", "Value", "Scope", "Updated"]);
    for fact in &facts {
        table.add_row(vec![
            Cell::new(&fact.key).fg(Color::Cyan),
            Cell::new(preview(&fact.value, 60)),
            Cell::new(fact.scope.to_string()).fg(Color::DarkGrey),
            Cell::new(fact.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Memories visible from {} ({} entries)", style(scope).cyan(), facts.len());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn exec(state: &AppState, session: &str, line: &str, json: bool) -> Result<()> {
    let command = MemoryCommand::parse(line)?;
    let reply = command.execute(&*state.memory, session).await?;

    if json {
        let result = serde_json::json!({ "reply": reply });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{reply}");
    }
    Ok(())
}

fn fact_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().map(|h| Cell::new(h).fg(Color::White)).collect::<Vec<_>>());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_resolution() {
        assert_eq!(ScopeArgs { global: false }.resolve("tg:1"), Scope::session("tg:1"));
        assert_eq!(ScopeArgs { global: true }.resolve("tg:1"), Scope::Global);
    }
}
