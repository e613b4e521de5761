//! Retrieval context command.

use anyhow::Result;
use clap::Args;
use console::style;

use recall_core::memory::retrieval::ComposeRequest;

use super::message::message_table;
use crate::state::AppState;

#[derive(Args)]
pub struct ContextArgs {
    /// Session id.
    pub session: String,

    /// Current turn text used for semantic matching.
    #[arg(default_value = "")]
    pub query: String,

    /// Size budget (defaults to `context_budget`).
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// Fact key to include exactly (repeatable).
    #[arg(short = 'k', long = "key")]
    pub keys: Vec<String>,
}

/// Compose and print the context an agent would receive for this turn.
pub async fn compose(state: &AppState, args: ContextArgs, json: bool) -> Result<()> {
    let budget = args
        .budget
        .unwrap_or(state.memory.config().context_budget);
    let request = ComposeRequest {
        session_id: args.session,
        query_text: args.query,
        budget,
        explicit_keys: args.keys,
    };
    let context = state.memory.compose_request(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!();
    println!(
        "  Context for '{}': {}/{} {}",
        style(&request.session_id).cyan(),
        context.used,
        context.budget,
        context.unit,
    );
    if context.degraded {
        println!(
            "  {} Semantic retrieval unavailable; short-term only",
            style("!").yellow().bold(),
        );
    }
    if context.is_over_budget() {
        println!(
            "  {} Required content exceeds the budget",
            style("!").yellow().bold(),
        );
    }
    println!();

    if let Some(preamble) = context.render_preamble() {
        for line in preamble.lines() {
            println!("  {}", style(line).dim());
        }
        println!();
    }

    if !context.messages.is_empty() {
        println!("{}", message_table(&context.messages));
        println!();
    }

    Ok(())
}
