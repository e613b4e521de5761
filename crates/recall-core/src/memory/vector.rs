//! Similarity ranking over fact embeddings.

use std::cmp::Ordering;

use recall_types::memory::{Fact, RankedFact};

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank `candidates` against `query` and keep the best `top_k`.
///
/// Order: similarity descending, then `updated_at` descending, then key
/// ascending. Candidates whose embedding length differs from the query are
/// skipped and counted in the second return value.
pub fn rank_facts(candidates: Vec<Fact>, query: &[f32], top_k: usize) -> (Vec<RankedFact>, usize) {
    if top_k == 0 {
        return (Vec::new(), 0);
    }

    let mut skipped = 0;
    let mut ranked: Vec<RankedFact> = candidates
        .into_iter()
        .filter_map(|fact| {
            if fact.embedding.len() != query.len() {
                skipped += 1;
                return None;
            }
            let score = cosine_similarity(&fact.embedding, query);
            Some(RankedFact {
                fact,
                score,
                exact: false,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.fact.updated_at.cmp(&a.fact.updated_at))
            .then_with(|| a.fact.key.cmp(&b.fact.key))
    });
    ranked.truncate(top_k);
    (ranked, skipped)
}
