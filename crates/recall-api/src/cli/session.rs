//! Session listing and inspection.

use anyhow::Result;
use chrono::Utc;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use crate::state::AppState;

/// List sessions, most recently active first.
pub async fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let sessions = state.memory.sessions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("recall append <session> <text>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Session").fg(Color::White),
        Cell::new("Platform").fg(Color::White),
        Cell::new("User").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Last active").fg(Color::White),
    ]);

    for session in &sessions {
        let count = state.memory.count_messages(&session.id).await?;
        table.add_row(vec![
            Cell::new(&session.id).fg(Color::Cyan),
            Cell::new(&session.platform),
            Cell::new(&session.user),
            Cell::new(count),
            Cell::new(session.last_active.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Show one session with its advisory lifecycle state.
pub async fn show_session(state: &AppState, id: &str, json: bool) -> Result<()> {
    let session = state.memory.session(id).await?;
    let lifecycle = state.memory.session_state(id).await?;
    let messages = state.memory.count_messages(id).await?;

    if json {
        let result = serde_json::json!({
            "session": session,
            "state": lifecycle,
            "messages": messages,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let idle_for = Utc::now() - session.last_active;
    println!();
    println!("  {} {}", style("Session").bold(), style(&session.id).cyan());
    println!("  Platform:    {}", session.platform);
    println!("  User:        {}", session.user);
    println!("  State:       {lifecycle}");
    println!("  Messages:    {messages}");
    println!("  Created:     {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  Last active: {} ({}m ago)",
        session.last_active.format("%Y-%m-%d %H:%M:%S"),
        idle_for.num_minutes(),
    );
    println!();
    Ok(())
}
