//! SQLite long-term fact repository implementation.
//!
//! Embeddings are stored as little-endian `f32` BLOBs. Upserts are guarded by
//! `write_ts` so a write that lost the race never overwrites a newer one.

use recall_core::repository::fact::FactRepository;
use recall_types::error::RepositoryError;
use recall_types::memory::{Fact, Scope, UpsertOutcome};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::pool::DatabasePool;
use super::{format_datetime, map_sqlx_error, parse_datetime};

/// SQLite-backed implementation of `FactRepository`.
pub struct SqliteFactRepository {
    pool: DatabasePool,
}

impl SqliteFactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, RepositoryError> {
    if bytes.len() % 4 != 0 {
        return Err(RepositoryError::Query(format!(
            "corrupt embedding: {} bytes is not a whole number of f32",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

struct FactRow {
    scope: String,
    key: String,
    value: String,
    embedding: Vec<u8>,
    embedding_model: String,
    created_at: String,
    updated_at: String,
    write_ts: i64,
}

impl FactRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            scope: row.try_get("scope")?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            embedding: row.try_get("embedding")?,
            embedding_model: row.try_get("embedding_model")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            write_ts: row.try_get("write_ts")?,
        })
    }

    fn into_fact(self) -> Result<Fact, RepositoryError> {
        let scope: Scope = self.scope.parse().map_err(RepositoryError::Query)?;
        Ok(Fact {
            scope,
            key: self.key,
            value: self.value,
            embedding: decode_embedding(&self.embedding)?,
            embedding_model: self.embedding_model,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            write_ts: self.write_ts,
        })
    }
}

fn rows_to_facts(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Fact>, RepositoryError> {
    rows.iter()
        .map(|r| {
            FactRow::from_row(r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_fact()
        })
        .collect()
}

/// Wrap `needle` in `%` wildcards, escaping `%`, `_` and `\` for `ESCAPE '\'`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const FACT_COLUMNS: &str =
    "scope, key, value, embedding, embedding_model, created_at, updated_at, write_ts";

impl FactRepository for SqliteFactRepository {
    async fn upsert_fact(&self, fact: &Fact) -> Result<UpsertOutcome, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "INSERT INTO facts (scope, key, value, embedding, embedding_model, created_at, updated_at, write_ts)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(scope, key) DO UPDATE SET
                 value = excluded.value,
                 embedding = excluded.embedding,
                 embedding_model = excluded.embedding_model,
                 updated_at = excluded.updated_at,
                 write_ts = excluded.write_ts
             WHERE excluded.write_ts > facts.write_ts",
        )
        .bind(fact.scope.to_string())
        .bind(&fact.key)
        .bind(&fact.value)
        .bind(encode_embedding(&fact.embedding))
        .bind(&fact.embedding_model)
        .bind(format_datetime(&fact.created_at))
        .bind(format_datetime(&fact.updated_at))
        .bind(fact.write_ts)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE scope = ? AND key = ?"
        ))
        .bind(fact.scope.to_string())
        .bind(&fact.key)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let stored = FactRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_fact()?;

        if result.rows_affected() > 0 {
            Ok(UpsertOutcome::Applied(stored))
        } else {
            Ok(UpsertOutcome::Superseded {
                current_write_ts: stored.write_ts,
            })
        }
    }

    async fn get_fact(&self, scope: &Scope, key: &str) -> Result<Option<Fact>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE scope = ? AND key = ?"
        ))
        .bind(scope.to_string())
        .bind(key)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| {
            FactRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_fact()
        })
        .transpose()
    }

    async fn delete_fact(&self, scope: &Scope, key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM facts WHERE scope = ? AND key = ?")
            .bind(scope.to_string())
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn facts_in_scopes(&self, scopes: &[Scope]) -> Result<Vec<Fact>, RepositoryError> {
        if scopes.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {FACT_COLUMNS} FROM facts WHERE scope IN ("));
        let mut separated = builder.separated(", ");
        for scope in scopes {
            separated.push_bind(scope.to_string());
        }
        separated.push_unseparated(")");

        let rows = builder
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        rows_to_facts(&rows)
    }

    async fn facts_needing_reembed(&self, current_model: &str) -> Result<Vec<Fact>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE embedding_model != ? ORDER BY scope, key"
        ))
        .bind(current_model)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        rows_to_facts(&rows)
    }

    async fn replace_embedding(
        &self,
        scope: &Scope,
        key: &str,
        expected_write_ts: i64,
        embedding: &[f32],
        embedding_model: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE facts SET embedding = ?, embedding_model = ?
             WHERE scope = ? AND key = ? AND write_ts = ?",
        )
        .bind(encode_embedding(embedding))
        .bind(embedding_model)
        .bind(scope.to_string())
        .bind(key)
        .bind(expected_write_ts)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_keyword(&self, scopes: &[Scope], needle: &str, limit: usize) -> Result<Vec<Fact>, RepositoryError> {
        if scopes.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = like_pattern(needle);

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {FACT_COLUMNS} FROM facts WHERE scope IN ("));
        let mut separated = builder.separated(", ");
        for scope in scopes {
            separated.push_bind(scope.to_string());
        }
        separated.push_unseparated(")");
        builder.push(" AND (key LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR value LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\') ORDER BY updated_at DESC, key ASC LIMIT ");
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        rows_to_facts(&rows)
    }

    async fn count_facts(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM facts")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_pool;
    use chrono::{Duration, Utc};

    fn fact(scope: Scope, key: &str, value: &str, write_ts: i64) -> Fact {
        let now = Utc::now();
        Fact {
            scope,
            key: key.to_string(),
            value: value.to_string(),
            embedding: vec![0.25, -1.5, 3.0],
            embedding_model: "hashing-256".to_string(),
            created_at: now,
            updated_at: now,
            write_ts,
        }
    }

    #[test]
    fn test_embedding_blob_layout() {
        let bytes = encode_embedding(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes).unwrap(), vec![1.0, -2.5]);
        assert!(decode_embedding(&bytes[..5]).is_err());
    }

    #[tokio::test]
    async fn test_upsert_insert_and_get() {
        let repo = SqliteFactRepository::new(test_pool().await);
        let outcome = repo.upsert_fact(&fact(Scope::Global, "name", "Alice", 10)).await.unwrap();
        assert!(outcome.is_applied());

        let stored = repo.get_fact(&Scope::Global, "name").await.unwrap().unwrap();
        assert_eq!(stored.value, "Alice");
        assert_eq!(stored.embedding, vec![0.25, -1.5, 3.0]);
        assert_eq!(stored.write_ts, 10);
        assert!(repo.get_fact(&Scope::session("s1"), "name").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_write_replaces_and_keeps_created_at() {
        let repo = SqliteFactRepository::new(test_pool().await);
        let mut first = fact(Scope::session("s1"), "k", "old", 10);
        first.created_at = Utc::now() - Duration::days(1);
        repo.upsert_fact(&first).await.unwrap();

        let outcome = repo.upsert_fact(&fact(Scope::session("s1"), "k", "new", 20)).await.unwrap();
        let UpsertOutcome::Applied(stored) = outcome else {
            panic!("expected applied");
        };
        assert_eq!(stored.value, "new");
        assert_eq!(stored.write_ts, 20);
        assert_eq!(
            stored.created_at.timestamp_micros(),
            first.created_at.timestamp_micros()
        );
        assert_eq!(repo.count_facts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_older_write_is_superseded() {
        let repo = SqliteFactRepository::new(test_pool().await);
        repo.upsert_fact(&fact(Scope::Global, "k", "winner", 50)).await.unwrap();

        let outcome = repo.upsert_fact(&fact(Scope::Global, "k", "late", 40)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Superseded { current_write_ts: 50 });

        let equal = repo.upsert_fact(&fact(Scope::Global, "k", "tie", 50)).await.unwrap();
        assert!(!equal.is_applied());
        assert_eq!(repo.get_fact(&Scope::Global, "k").await.unwrap().unwrap().value, "winner");
    }

    #[tokio::test]
    async fn test_facts_in_scopes_and_delete() {
        let repo = SqliteFactRepository::new(test_pool().await);
        repo.upsert_fact(&fact(Scope::Global, "g", "1", 1)).await.unwrap();
        repo.upsert_fact(&fact(Scope::session("a"), "x", "2", 2)).await.unwrap();
        repo.upsert_fact(&fact(Scope::session("b"), "y", "3", 3)).await.unwrap();

        let visible = repo
            .facts_in_scopes(&Scope::session("a").visible())
            .await
            .unwrap();
        let mut keys: Vec<String> = visible.into_iter().map(|f| f.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["g", "x"]);
        assert!(repo.facts_in_scopes(&[]).await.unwrap().is_empty());

        assert!(repo.delete_fact(&Scope::session("a"), "x").await.unwrap());
        assert!(!repo.delete_fact(&Scope::session("a"), "x").await.unwrap());
        assert_eq!(repo.count_facts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_facts_needing_reembed() {
        let repo = SqliteFactRepository::new(test_pool().await);
        repo.upsert_fact(&fact(Scope::Global, "current", "v", 1)).await.unwrap();
        let mut stale = fact(Scope::Global, "stale", "v", 2);
        stale.embedding_model = "text-embedding-3-small".to_string();
        repo.upsert_fact(&stale).await.unwrap();

        let needing = repo.facts_needing_reembed("hashing-256").await.unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].key, "stale");
    }

    #[tokio::test]
    async fn test_replace_embedding_requires_unchanged_write_ts() {
        let repo = SqliteFactRepository::new(test_pool().await);
        let mut unembedded = fact(Scope::Global, "b", "coffee", 10);
        unembedded.embedding = Vec::new();
        unembedded.embedding_model = "none".to_string();
        repo.upsert_fact(&unembedded).await.unwrap();

        // A newer write lands between the read and the re-embed.
        repo.upsert_fact(&fact(Scope::Global, "b", "lisbon", 20)).await.unwrap();
        let replaced = repo
            .replace_embedding(&Scope::Global, "b", 10, &[1.0, 0.0], "hashing-2")
            .await
            .unwrap();
        assert!(!replaced);
        let stored = repo.get_fact(&Scope::Global, "b").await.unwrap().unwrap();
        assert_eq!(stored.value, "lisbon");
        assert_eq!(stored.embedding_model, "hashing-256");

        assert!(repo
            .replace_embedding(&Scope::Global, "b", 20, &[1.0, 0.0], "hashing-2")
            .await
            .unwrap());
        let stored = repo.get_fact(&Scope::Global, "b").await.unwrap().unwrap();
        assert_eq!(stored.value, "lisbon");
        assert_eq!(stored.write_ts, 20);
        assert_eq!(stored.embedding, vec![1.0, 0.0]);
        assert_eq!(stored.embedding_model, "hashing-2");
        assert!(!repo
            .replace_embedding(&Scope::Global, "missing", 20, &[1.0], "hashing-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_search_keyword_matches_key_or_value_newest_first() {
        let repo = SqliteFactRepository::new(test_pool().await);
        let mut older = fact(Scope::Global, "drink", "Green Tea", 1);
        older.updated_at = Utc::now() - Duration::hours(1);
        repo.upsert_fact(&older).await.unwrap();
        repo.upsert_fact(&fact(Scope::session("a"), "tea_time", "five", 2)).await.unwrap();
        repo.upsert_fact(&fact(Scope::session("b"), "other", "tea", 3)).await.unwrap();
        repo.upsert_fact(&fact(Scope::Global, "city", "lisbon", 4)).await.unwrap();

        let scopes = Scope::session("a").visible();
        let keys: Vec<String> = repo
            .search_keyword(&scopes, "tea", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.key)
            .collect();
        assert_eq!(keys, vec!["tea_time", "drink"]);

        assert_eq!(repo.search_keyword(&scopes, "", 10).await.unwrap().len(), 3);
        assert_eq!(repo.search_keyword(&scopes, "", 1).await.unwrap().len(), 1);
        // LIKE wildcards in the needle are literal.
        assert!(repo.search_keyword(&scopes, "%", 10).await.unwrap().is_empty());
        let underscore = repo.search_keyword(&scopes, "a_t", 10).await.unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].key, "tea_time");
    }
}
