//! Error handling for the chaintrace ledger client

use crate::product::ProductStatus;
use thiserror::Error;

/// Main error type for the chaintrace client
#[derive(Error, Debug)]
pub enum ChainTraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: ProductStatus,
        to: ProductStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Node rejected request: {code}: {message}")]
    NodeRejected { code: i64, message: String },

    #[error("Connection lost: {endpoint}")]
    ConnectionLost { endpoint: String },

    #[error("Malformed node response: {0}")]
    Rpc(String),

    #[error("ABI encoding error: {0}")]
    Abi(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: {operation} took longer than {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the chaintrace client
pub type Result<T> = std::result::Result<T, ChainTraceError>;

impl ChainTraceError {
    /// Transient conditions are safe to retry with the identical request;
    /// everything else is a definitive answer or a caller bug.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainTraceError::Network(_)
                | ChainTraceError::ConnectionLost { .. }
                | ChainTraceError::Timeout { .. }
        )
    }
}

impl From<anyhow::Error> for ChainTraceError {
    fn from(err: anyhow::Error) -> Self {
        ChainTraceError::Internal(err.to_string())
    }
}
