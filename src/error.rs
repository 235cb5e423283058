//! Error types for nairkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using NairError
pub type Result<T> = std::result::Result<T, NairError>;

/// Unified error type for nairkv operations
#[derive(Debug, Error)]
pub enum NairError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    /// Arguments rejected before anything was sent
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Frame from the server could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request {request_id} timed out after {elapsed_ms} ms")]
    Timeout { request_id: u32, elapsed_ms: u64 },

    #[error("Connection to {endpoint} gave up after {attempts} reconnect attempts")]
    RetriesExhausted { endpoint: String, attempts: u32 },

    // -------------------------------------------------------------------------
    // Pool Errors
    // -------------------------------------------------------------------------
    #[error("No available connection")]
    PoolExhausted,

    // -------------------------------------------------------------------------
    // Client Errors
    // -------------------------------------------------------------------------
    /// The server answered, but with a failure code
    #[error("{operation} failed with code {code}")]
    OperationFailed { operation: &'static str, code: u16 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NairError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        NairError::Connection(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        NairError::Protocol(message.into())
    }

    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        NairError::Encoding(message.into())
    }

    /// True for errors raised by the transport rather than by the request itself
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            NairError::Io(_) | NairError::Connection(_) | NairError::RetriesExhausted { .. }
        )
    }
}
