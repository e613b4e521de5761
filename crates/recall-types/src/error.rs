use thiserror::Error;

/// Errors from repository operations (used by trait definitions in recall-core).
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage operation timed out after {0}ms")]
    Timeout(u64),
}

impl RepositoryError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Connection loss, busy databases, and timeouts are transient; malformed
    /// queries, corrupt rows, and missing entities are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Connection(_) | RepositoryError::Timeout(_))
    }
}

/// Errors raised by consumed capabilities (embedding provider, summarizer).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider timed out after {0}ms")]
    Timeout(u64),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the memory subsystem to its callers.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl MemoryError {
    pub fn session_not_found(session_id: &str) -> Self {
        MemoryError::NotFound {
            what: format!("session '{session_id}'"),
        }
    }

    pub fn key_not_found(key: &str) -> Self {
        MemoryError::NotFound {
            what: format!("key '{key}'"),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MemoryError::NotFound { .. })
    }
}

impl From<RepositoryError> for MemoryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => MemoryError::NotFound {
                what: "entity".to_string(),
            },
            RepositoryError::Conflict(msg) => MemoryError::Conflict(msg),
            other => MemoryError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_transient_classification() {
        assert!(RepositoryError::Connection("busy".into()).is_transient());
        assert!(RepositoryError::Timeout(500).is_transient());
        assert!(!RepositoryError::Query("bad".into()).is_transient());
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::Conflict("k".into()).is_transient());
    }

    #[test]
    fn test_memory_error_from_repository() {
        let err: MemoryError = RepositoryError::Timeout(250).into();
        assert!(matches!(err, MemoryError::Storage(_)));
        assert!(err.to_string().contains("250ms"));

        let err: MemoryError = RepositoryError::Conflict("name".into()).into();
        assert!(matches!(err, MemoryError::Conflict(_)));
    }

    #[test]
    fn test_not_found_display() {
        let err = MemoryError::key_not_found("name");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "key 'name' not found");

        let err = MemoryError::session_not_found("tg:42");
        assert_eq!(err.to_string(), "session 'tg:42' not found");
    }

    #[test]
    fn test_provider_error_converts() {
        let err: MemoryError = ProviderError::Timeout(5000).into();
        assert!(matches!(err, MemoryError::Provider(ProviderError::Timeout(5000))));
    }
}
