//! Error types for configuration loading and RPC calls.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors loading the node configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors talking to a backend service.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("{endpoint} request failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} rejected the call: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("malformed {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
}
