//! FactRepository trait definition.
//!
//! Durable key/value storage for long-term facts and their embeddings.
//! Similarity ranking happens in the core (`memory::vector`), so backends
//! only need key lookups, scope scans and a substring search.

use recall_types::error::RepositoryError;
use recall_types::memory::{Fact, Scope, UpsertOutcome};

/// Repository trait for long-term fact persistence.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in recall-infra.
pub trait FactRepository: Send + Sync {
    /// Insert or replace the fact at `(scope, key)` under last-write-wins.
    ///
    /// An existing row is replaced only when its `write_ts` is older than
    /// `fact.write_ts`; `created_at` of an existing row is preserved.
    /// Otherwise returns `Superseded` with the stored timestamp.
    fn upsert_fact(
        &self,
        fact: &Fact,
    ) -> impl std::future::Future<Output = Result<UpsertOutcome, RepositoryError>> + Send;

    /// Exact-key lookup.
    fn get_fact(
        &self,
        scope: &Scope,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Fact>, RepositoryError>> + Send;

    /// Delete a fact. Returns `false` if it did not exist.
    fn delete_fact(
        &self,
        scope: &Scope,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Every fact in any of the given scopes (candidates for similarity search).
    fn facts_in_scopes(
        &self,
        scopes: &[Scope],
    ) -> impl std::future::Future<Output = Result<Vec<Fact>, RepositoryError>> + Send;

    /// Facts whose embedding was produced by a model other than `current_model`.
    ///
    /// Used to find facts that need re-embedding after a model change.
    fn facts_needing_reembed(
        &self,
        current_model: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Fact>, RepositoryError>> + Send;

    /// Swap in a fresh embedding while the fact is still the one that was read.
    ///
    /// Applies only when the stored `write_ts` equals `expected_write_ts`;
    /// value and timestamps are left untouched. Returns `false` when the fact
    /// was rewritten or deleted in the meantime.
    fn replace_embedding(
        &self,
        scope: &Scope,
        key: &str,
        expected_write_ts: i64,
        embedding: &[f32],
        embedding_model: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Facts in the given scopes whose key or value contains `needle`
    /// (case-insensitive), most recently updated first, at most `limit`.
    ///
    /// An empty needle matches every fact.
    fn search_keyword(
        &self,
        scopes: &[Scope],
        needle: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Fact>, RepositoryError>> + Send;

    /// Total number of facts across all scopes.
    fn count_facts(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
