//! Error types for host network configuration.

use thiserror::Error;

/// Result type alias for configurator operations.
pub type Result<T> = std::result::Result<T, NetconfError>;

/// Errors that can occur while reconfiguring the host network.
#[derive(Debug, Error)]
pub enum NetconfError {
    /// Interface name failed validation and was never passed to a command.
    #[error(
        "invalid interface name {0:?}: must be 1-15 alphanumeric characters, hyphens, underscores, or dots"
    )]
    InvalidInterfaceName(String),

    /// Address failed CIDR validation.
    #[error("invalid CIDR address {0:?}")]
    InvalidCidr(String),

    /// String failed IP address validation.
    #[error("invalid IP address {0:?}")]
    InvalidIp(String),

    /// The prefix length has no supported dotted-netmask form.
    #[error("unsupported prefix length /{0}")]
    UnsupportedPrefix(u8),

    /// An OS command could not be spawned.
    #[error("failed to run {command:?}: {source}")]
    Spawn {
        /// The full command line.
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An OS command exited unsuccessfully. Carries the combined
    /// stdout/stderr so the failure is diagnosable from the log alone.
    #[error("command {command:?} failed: {output}")]
    CommandFailed {
        /// The full command line.
        command: String,
        /// Combined stdout and stderr of the failed command.
        output: String,
    },

    /// The capability is not available on this platform.
    #[error("{0}")]
    Unsupported(String),
}
