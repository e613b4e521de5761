//! Configuration loader for Recall.
//!
//! Reads `config.toml` from the data directory (`~/.recall/` by default) and
//! deserializes it into [`MemoryConfig`]. Falls back to defaults when the
//! file is missing or malformed; rejects configurations that parse but
//! cannot run.

use std::path::{Path, PathBuf};

use recall_types::config::MemoryConfig;
use recall_types::error::MemoryError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RECALL_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `RECALL_DATA_DIR` environment variable
/// 2. `~/.recall`
/// 3. `.recall` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".recall");
    }
    PathBuf::from(".recall")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Load configuration from `path`.
///
/// - Missing file: [`MemoryConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
/// - Parsed but invalid (e.g. `max_messages = 0`): `InvalidInput`.
pub async fn load_config(path: &Path) -> Result<MemoryConfig, MemoryError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return Ok(MemoryConfig::default());
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return Ok(MemoryConfig::default());
        }
    };

    let config = match toml::from_str::<MemoryConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            return Ok(MemoryConfig::default());
        }
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&config_path(tmp.path())).await.unwrap();
        assert_eq!(config.max_messages, 1000);
        assert!(config.summarizer.is_none());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = config_path(tmp.path());
        tokio::fs::write(
            &path,
            r#"
max_messages = 20
embedding_model = "hashing-64"
context_budget = 500
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.max_messages, 20);
        assert_eq!(config.embedding_model, "hashing-64");
        assert_eq!(config.context_budget, 500);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = config_path(tmp.path());
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.max_messages, 1000);
    }

    #[tokio::test]
    async fn load_config_zero_cap_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = config_path(tmp.path());
        tokio::fs::write(&path, "max_messages = 0").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: no other test in this crate reads RECALL_DATA_DIR.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-recall");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-recall"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
