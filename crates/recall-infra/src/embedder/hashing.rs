//! Deterministic feature-hashing embedder.
//!
//! Needs no model download and no network: every lowercase word and every
//! character trigram of a word is hashed (SHA-256, first 8 bytes) into one
//! of `dimension` buckets with a hash-derived sign, then the vector is
//! L2-normalized. Texts sharing words or word fragments score high under
//! cosine similarity.

use std::future::Future;

use recall_core::memory::embedder::Embedder;
use recall_types::error::ProviderError;
use sha2::{Digest, Sha256};

/// Model-name prefix; the suffix is the dimension (`hashing-256`).
pub const HASHING_PREFIX: &str = "hashing-";

/// Trigrams weigh less than whole words.
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("{HASHING_PREFIX}{dimension}"),
            dimension,
        }
    }

    /// Parse `hashing-<dimension>`; `None` for other model names.
    pub fn from_model_name(model: &str) -> Option<Self> {
        let digits = model.strip_prefix(HASHING_PREFIX)?;
        let dimension: usize = digits.parse().ok()?;
        // Only the canonical spelling, so the name round-trips through model_name().
        (dimension > 0 && dimension.to_string() == digits).then(|| Self::new(dimension))
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(bytes);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add_feature(&mut vector, word, 1.0);

            let chars: Vec<char> = format!("^{word}$").chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        let vector = self.vectorize(text);
        async move { Ok(vector) }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
