//! Application state wiring the memory service to its infrastructure.
//!
//! `MemoryService` is generic over repository traits; AppState pins it to
//! the SQLite implementations and the configured providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use recall_core::memory::service::MemoryService;
use recall_infra::config::{config_path, load_config, resolve_data_dir};
use recall_infra::embedder::build_embedder;
use recall_infra::sqlite::fact::SqliteFactRepository;
use recall_infra::sqlite::message::SqliteMessageRepository;
use recall_infra::sqlite::pool::{database_url, DatabasePool};
use recall_infra::sqlite::session::SqliteSessionRepository;
use recall_infra::summarizer::build_summarizer;

/// Memory service pinned to the SQLite repositories.
pub type ConcreteMemoryService =
    MemoryService<SqliteSessionRepository, SqliteMessageRepository, SqliteFactRepository>;

pub struct AppState {
    pub memory: Arc<ConcreteMemoryService>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Load config, open the database, and wire the memory service.
    ///
    /// `config_override` replaces `<data_dir>/config.toml`.
    pub async fn init(config_override: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = config_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_path(&data_dir));
        let config = load_config(&path).await?;

        let url = database_url(config.storage_location.as_deref(), &data_dir);
        let db_pool = DatabasePool::new(&url)
            .await
            .with_context(|| format!("failed to open database at {url}"))?;

        let embedder = build_embedder(&config)?;
        let summarizer = build_summarizer(&config)?;

        let memory = MemoryService::new(
            config,
            Arc::new(SqliteSessionRepository::new(db_pool.clone())),
            Arc::new(SqliteMessageRepository::new(db_pool.clone())),
            Arc::new(SqliteFactRepository::new(db_pool.clone())),
            embedder,
            summarizer,
        )?;

        tracing::debug!(data_dir = %data_dir.display(), config = %path.display(), "memory store opened");

        Ok(Self {
            memory: Arc::new(memory),
            data_dir,
            db_pool,
        })
    }

    /// Release storage handles. Call once before exit.
    pub async fn close(self) {
        drop(self.memory);
        self.db_pool.close().await;
    }
}
