//! Recall CLI entry point.
//!
//! Binary name: `recall`
//!
//! Parses CLI arguments, initializes tracing, opens the memory store, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use recall_observe::tracing_setup::{filter_for, init_tracing, shutdown_tracing, LogFormat, TracingOptions};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(TracingOptions {
        filter: filter_for(cli.verbose, cli.quiet).to_string(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        enable_otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "recall", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.as_deref()).await?;
    let result = run(&state, cli.command, cli.json).await;

    state.close().await;
    shutdown_tracing();
    result
}

async fn run(state: &AppState, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Append(args) => cli::message::append(state, args, json).await,
        Commands::Recent { session, limit } => cli::message::recent(state, &session, limit, json).await,
        Commands::Context(args) => cli::context::compose(state, args, json).await,
        Commands::Sessions => cli::session::list_sessions(state, json).await,
        Commands::Session { id } => cli::session::show_session(state, &id, json).await,
        Commands::Memory { action } => cli::memory::handle_memory_command(action, state, json).await,
        Commands::Reindex => cli::status::reindex(state, json).await,
        Commands::Status => cli::status::status(state, json).await,
        Commands::Completions { .. } => Ok(()),
    }
}
