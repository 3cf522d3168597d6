//! Error types for WireGuard key and tunnel operations.

use thiserror::Error;

/// Result type alias for WireGuard operations.
pub type Result<T> = std::result::Result<T, WireGuardError>;

/// Errors that can occur during WireGuard key and tunnel operations.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// Invalid base64 encoding (bad alphabet or padding).
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid hex encoding.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Decoded key has the wrong length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Unknown log level name.
    #[error("invalid log level {0:?}: must be one of verbose, error, silent")]
    InvalidLogLevel(String),

    /// The tunnel has been closed; no further operations are possible.
    #[error("tunnel is closed")]
    TunnelClosed,

    /// The underlying WireGuard device reported a failure.
    #[error("device error: {0}")]
    Device(String),
}
