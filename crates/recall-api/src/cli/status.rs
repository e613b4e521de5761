//! Storage and configuration overview, plus reindexing.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Display counts and the effective configuration.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let config = state.memory.config();
    let sessions = state.memory.sessions().await?;
    let facts = state.memory.count_facts().await?;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "sessions": sessions.len(),
            "facts": facts,
            "max_messages": config.max_messages,
            "embedding_model": config.embedding_model,
            "summarizer": config.summarizer.as_ref().map(|s| s.model.clone()),
            "context_budget": config.context_budget,
            "budget_unit": config.budget_unit,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} Recall v{}", style("*").bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Data dir:        {}", state.data_dir.display());
    println!("  Sessions:        {}", sessions.len());
    println!("  Facts:           {facts}");
    println!("  Short-term cap:  {}", config.max_messages);
    println!("  Embedding model: {}", config.embedding_model);
    println!(
        "  Summarizer:      {}",
        config
            .summarizer
            .as_ref()
            .map_or("disabled", |s| s.model.as_str())
    );
    println!(
        "  Context budget:  {} {}",
        config.context_budget, config.budget_unit
    );
    println!();
    Ok(())
}

/// Re-embed facts whose embedding model differs from the configured one.
pub async fn reindex(state: &AppState, json: bool) -> Result<()> {
    let report = state.memory.reindex().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Re-embedded {} fact(s) with '{}'",
        style("ok").green(),
        report.reembedded,
        style(&state.memory.config().embedding_model).cyan(),
    );
    if report.superseded > 0 {
        println!("     {} skipped: rewritten concurrently", report.superseded);
    }
    if report.failed > 0 {
        println!(
            "  {} {} fact(s) failed; run again later",
            style("!").yellow().bold(),
            report.failed,
        );
    }
    println!();
    Ok(())
}
