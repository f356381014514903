//! Proxy error types.

use divy_runtime::RuntimeError;

/// Errors that can occur while configuring or running the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Invalid or conflicting configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host runtime refused an operation.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// HTTP client construction failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred (bind, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
