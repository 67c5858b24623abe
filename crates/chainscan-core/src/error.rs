//! Error types for the chainscan pipeline.

use thiserror::Error;

/// Errors that can occur while fetching, applying or reading blocks.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The node could not be reached or answered with a transport failure.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node answered, but rejected the request.
    #[error("RPC execution error {code}: {message}")]
    RpcExecution { code: i64, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Ledger error at block {height}: {reason}")]
    Ledger { height: u64, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for node-availability errors that a fetch job retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    pub fn codec(e: impl std::fmt::Display) -> Self {
        Self::Codec(e.to_string())
    }

    pub fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rpc_errors_are_transient() {
        assert!(IndexerError::Rpc("connection refused".into()).is_transient());
        assert!(!IndexerError::RpcExecution {
            code: -32000,
            message: "execution reverted".into()
        }
        .is_transient());
        assert!(!IndexerError::Storage("disk full".into()).is_transient());
    }
}
