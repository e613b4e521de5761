//! CLI command definitions for the `recall` binary.
//!
//! Uses clap derive macros for argument parsing. Every command operates on
//! one memory store resolved from `RECALL_DATA_DIR` (default `~/.recall`).

pub mod context;
pub mod memory;
pub mod message;
pub mod session;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Conversational memory: short-term logs, long-term facts, retrieval.
#[derive(Parser)]
#[command(name = "recall", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of `<data_dir>/config.toml`.
    #[arg(long, global = true, env = "RECALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a message in a session (created on first use).
    Append(message::AppendArgs),

    /// Show the most recent messages of a session.
    Recent {
        /// Session id.
        session: String,

        /// Number of messages (defaults to `recent_limit`).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Compose the retrieval context for a turn.
    Context(context::ContextArgs),

    /// List sessions, most recently active first.
    #[command(alias = "ls")]
    Sessions,

    /// Show one session with its lifecycle state.
    Session {
        /// Session id.
        id: String,
    },

    /// Manage long-term memories (set, get, delete, search, list, exec).
    Memory {
        #[command(subcommand)]
        action: memory::MemoryCliCommand,
    },

    /// Re-embed facts written by a different embedding model.
    Reindex,

    /// Storage and configuration overview.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
