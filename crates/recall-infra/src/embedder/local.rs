//! FastEmbed-based local embedding generator.
//!
//! Runs BGE-small-en-v1.5 (384 dimensions) through the ONNX runtime. Model
//! weights are downloaded on first use into the fastembed cache directory.

use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use recall_core::memory::embedder::Embedder;
use recall_types::error::ProviderError;

pub const LOCAL_MODEL_NAME: &str = "bge-small-en-v1.5";
const LOCAL_DIMENSION: usize = 384;

/// Local embedder; inference runs on the blocking thread pool.
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
    pub fn new() -> Result<Self, ProviderError> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::BGESmallENV15))
            .map_err(|e| ProviderError::Unavailable(format!("failed to load local model: {e}")))?;
        tracing::info!(model = LOCAL_MODEL_NAME, "local embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

impl Embedder for LocalEmbedder {
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        async move {
            let mut vectors = tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| ProviderError::Unavailable("local model poisoned".to_string()))?;
                model
                    .embed(vec![text], None)
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
            })
            .await
            .map_err(|e| ProviderError::Unavailable(format!("embedding task failed: {e}")))??;
            vectors
                .pop()
                .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned".to_string()))
        }
    }

    fn model_name(&self) -> &str {
        LOCAL_MODEL_NAME
    }

    fn dimension(&self) -> usize {
        LOCAL_DIMENSION
    }
}
