//! Error types for minidruid

use thiserror::Error;

/// Core error type for pool and data-source operations
#[derive(Error, Debug)]
pub enum MiniDruidError {
    /// Invalid bounds or missing credentials, detected at pool construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// No connection became free before the wait deadline
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    /// A connection failed its health check and retries were used up
    #[error("Validation error: {0}")]
    Validation(String),

    /// The pool has been closed
    #[error("Pool closed: {0}")]
    PoolClosed(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl MiniDruidError {
    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted(_) | Self::Connection(_) | Self::Timeout(_)
        )
    }

    /// Short, stable name of the error kind, used in logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::PoolExhausted(_) => "pool_exhausted",
            Self::Validation(_) => "validation",
            Self::PoolClosed(_) => "pool_closed",
            Self::Connection(_) => "connection",
            Self::Query(_) => "query",
            Self::Transaction(_) => "transaction",
            Self::Timeout(_) => "timeout",
            Self::Security(_) => "security",
            Self::NotSupported(_) => "not_supported",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

/// Result type alias for minidruid operations
pub type Result<T> = std::result::Result<T, MiniDruidError>;
