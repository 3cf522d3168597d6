//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML could not be parsed (malformed syntax or unknown keys).
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A required field is absent.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field is present but invalid.
    #[error("{field}: {reason}")]
    InvalidField {
        /// The offending config key.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
