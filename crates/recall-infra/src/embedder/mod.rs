//! Embedding providers and the factory that picks one from configuration.

pub mod hashing;
#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod openai;

use recall_core::memory::box_embedder::BoxEmbedder;
use recall_types::config::MemoryConfig;
use recall_types::error::MemoryError;
use secrecy::SecretString;

use self::hashing::HashingEmbedder;
use self::openai::OpenAiCompatEmbedder;

/// Model name that disables embedding; facts are then found by key or keyword.
pub const DISABLED_MODEL: &str = "none";

/// Build the embedder named by `config.embedding_model`.
///
/// Resolution order:
/// 1. `none` disables semantic search.
/// 2. `hashing-<dim>` uses the built-in feature-hashing embedder.
/// 3. With `embedding_endpoint` set, an OpenAI-compatible HTTP embedder.
/// 4. `bge-small-en-v1.5` with the `local-embeddings` feature.
pub fn build_embedder(config: &MemoryConfig) -> Result<Option<BoxEmbedder>, MemoryError> {
    let model = config.embedding_model.trim();
    if model == DISABLED_MODEL {
        return Ok(None);
    }

    if let Some(embedder) = HashingEmbedder::from_model_name(model) {
        return Ok(Some(BoxEmbedder::new(embedder)));
    }

    if let Some(endpoint) = &config.embedding_endpoint {
        let dimension = config
            .embedding_dimension
            .or_else(|| openai::known_dimension(model))
            .ok_or_else(|| {
                MemoryError::InvalidInput(format!(
                    "unknown dimension for embedding model '{model}'; set embedding_dimension"
                ))
            })?;
        let api_key = std::env::var(&config.embedding_api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        let embedder = OpenAiCompatEmbedder::new(
            endpoint,
            api_key,
            model,
            dimension,
            config.embedding_timeout(),
        )?;
        return Ok(Some(BoxEmbedder::new(embedder)));
    }

    #[cfg(feature = "local-embeddings")]
    {
        if model == local::LOCAL_MODEL_NAME {
            return Ok(Some(BoxEmbedder::new(local::LocalEmbedder::new()?)));
        }
    }

    Err(MemoryError::InvalidInput(format!(
        "embedding model '{model}' needs an embedding_endpoint"
    )))
}
