//! Error types for the VPN client.

use thiserror::Error;

/// Errors that can occur while connecting or disconnecting the VPN client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Key handling or tunnel operation failed.
    #[error(transparent)]
    WireGuard(#[from] burrow_wireguard::WireGuardError),

    /// Host network reconfiguration failed.
    #[error(transparent)]
    Netconf(#[from] burrow_netconf::NetconfError),

    /// The HTTP round trip itself failed (connect, timeout, body read).
    #[error("registration request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("registration rejected (HTTP {status}): {body}")]
    Rejected {
        /// The HTTP status code.
        status: u16,
        /// The response body, as far as it could be read.
        body: String,
    },

    /// Every attempt in the retry schedule failed.
    #[error("registration failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// The error from the final attempt.
        last: Box<ClientError>,
    },

    /// The server's registration response failed validation.
    #[error("invalid registration response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether this error is worth another registration attempt.
    /// Authentication failures are terminal; hammering them cannot help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Rejected { status, .. } => *status != 401,
            _ => false,
        }
    }
}
