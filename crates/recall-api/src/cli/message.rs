//! Short-term log commands: append and recent.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use recall_types::message::{Message, Role};

use super::preview;
use crate::state::AppState;

#[derive(Args)]
pub struct AppendArgs {
    /// Session id (stable external identity, e.g. `telegram:42`).
    pub session: String,

    /// Message text.
    pub content: String,

    /// Author role.
    #[arg(long, default_value = "user")]
    pub role: Role,

    /// Never evict this message.
    #[arg(long)]
    pub pin: bool,

    /// Platform recorded when the session is created.
    #[arg(long, default_value = "cli")]
    pub platform: String,

    /// User recorded when the session is created.
    #[arg(long, default_value = "local")]
    pub user: String,
}

/// Append a message, creating the session on first use.
pub async fn append(state: &AppState, args: AppendArgs, json: bool) -> Result<()> {
    let outcome = state
        .memory
        .record_message(
            &args.session,
            &args.platform,
            &args.user,
            args.role,
            &args.content,
            args.pin,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Stored message #{} in '{}'",
        style("ok").green(),
        outcome.message.seq,
        style(&args.session).cyan(),
    );
    let prune = &outcome.prune;
    if !prune.evicted.is_empty() {
        println!(
            "     Evicted {} message(s), promoted {} fact(s)",
            prune.evicted.len(),
            prune.promoted.len(),
        );
    }
    if prune.pinned_overflow {
        println!(
            "  {} Only pinned messages remain above the cap",
            style("!").yellow().bold(),
        );
    }
    println!();

    Ok(())
}

/// Show recent messages, oldest first.
pub async fn recent(state: &AppState, session: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let messages = state.memory.get_recent(session, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages in '{}'.",
            style("i").blue().bold(),
            style(session).cyan(),
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", message_table(&messages));
    println!();
    Ok(())
}

pub(crate) fn message_table(messages: &[Message]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("At").fg(Color::White),
    ]);

    for message in messages {
        let seq = if message.pinned {
            format!("{} *", message.seq)
        } else {
            message.seq.to_string()
        };
        table.add_row(vec![
            Cell::new(seq),
            Cell::new(message.role.to_string()).fg(Color::Cyan),
            Cell::new(preview(&message.content, 80)),
            Cell::new(message.created_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }
    table
}
