//! TOML configuration for the Burrow VPN server and client.
//!
//! Configuration is loaded leniently (missing keys fall back to defaults)
//! and validated explicitly, so an operator sees which field is wrong rather
//! than a generic parse failure. Unknown keys are rejected: client configs
//! name the server as `server` + `api_port`, and configs carrying other
//! layouts fail at parse time instead of being half-honored.

use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use burrow_wireguard::{LogLevel, PublicKey};

pub mod error;
pub use error::ConfigError;

/// Default WireGuard listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 51820;
/// Default registration API port.
pub const DEFAULT_API_PORT: u16 = 8080;
/// Default tunnel MTU.
pub const DEFAULT_MTU: u16 = 1420;
/// Default server tunnel address.
pub const DEFAULT_ADDRESS: &str = "10.0.0.1/24";
/// Default persistent keepalive interval in seconds.
pub const DEFAULT_PERSISTENT_KEEPALIVE: u16 = 25;
/// Default tunnel interface name.
pub const DEFAULT_INTERFACE_NAME: &str = "wg0";
/// Default engine log level.
pub const DEFAULT_LOG_LEVEL: &str = "error";

/// DNS servers advertised to clients when none are configured.
pub fn default_dns_servers() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
}

static IFACE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,14}$").unwrap_or_else(|_| unreachable!()));

/// VPN server configuration (`server.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// WireGuard UDP listen port.
    pub listen_port: u16,
    /// The server's in-tunnel address in CIDR form; also defines the
    /// allocation subnet.
    pub address: String,
    /// The server's private key, base64.
    pub private_key: String,
    /// The server's public key, base64.
    pub public_key: String,
    /// Registration API port.
    pub api_port: u16,
    /// Externally reachable host (DNS name or IP) advertised to clients.
    pub external_host: String,
    /// DNS servers advertised to clients.
    pub dns_servers: Vec<String>,
    /// Tunnel MTU.
    pub mtu: u16,
    /// Tunnel interface name.
    pub interface_name: String,
    /// Shared API key; empty disables authentication.
    pub api_key: String,
    /// Engine log level: verbose, error, or silent.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            address: DEFAULT_ADDRESS.to_string(),
            private_key: String::new(),
            public_key: String::new(),
            api_port: DEFAULT_API_PORT,
            external_host: String::new(),
            dns_servers: default_dns_servers(),
            mtu: DEFAULT_MTU,
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            api_key: String::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// VPN client configuration (`client.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server host (DNS name or IP).
    pub server: String,
    /// Server registration API port.
    pub api_port: u16,
    /// Cached server public key, base64; refreshed at registration.
    pub server_public_key: String,
    /// The client's private key, base64.
    pub private_key: String,
    /// Cached assigned tunnel address; refreshed at registration.
    pub address: String,
    /// DNS server to use inside the tunnel.
    pub dns: String,
    /// Tunnel MTU.
    pub mtu: u16,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: u16,
    /// Tunnel interface name.
    pub interface_name: String,
    /// Shared API key presented at registration.
    pub api_key: String,
    /// Engine log level: verbose, error, or silent.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            api_port: DEFAULT_API_PORT,
            server_public_key: String::new(),
            private_key: String::new(),
            address: String::new(),
            dns: String::new(),
            mtu: DEFAULT_MTU,
            persistent_keepalive: DEFAULT_PERSISTENT_KEEPALIVE,
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            api_key: String::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Base URL of the server's registration API.
    #[must_use]
    pub fn server_api_url(&self) -> String {
        format!("http://{}:{}", self.server, self.api_port)
    }
}

/// Reads and parses a server config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_server_config(&data)
}

/// Parses a server config from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or carries unknown keys.
pub fn parse_server_config(data: &str) -> Result<ServerConfig, ConfigError> {
    toml::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Reads and parses a client config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_client_config(&data)
}

/// Parses a client config from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or carries unknown keys.
pub fn parse_client_config(data: &str) -> Result<ClientConfig, ConfigError> {
    toml::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))
}

impl ServerConfig {
    /// Checks that all required fields are present and valid.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.is_empty() {
            return Err(ConfigError::MissingField("private_key"));
        }
        validate_base64_key(&self.private_key, "private_key")?;
        if self.public_key.is_empty() {
            return Err(ConfigError::MissingField("public_key"));
        }
        validate_base64_key(&self.public_key, "public_key")?;
        if self.external_host.is_empty() {
            return Err(ConfigError::MissingField("external_host"));
        }
        if self.address.parse::<ipnet::Ipv4Net>().is_err() {
            return Err(ConfigError::InvalidField {
                field: "address",
                reason: format!("{:?} is not valid IPv4 CIDR", self.address),
            });
        }
        validate_port(self.listen_port, "listen_port")?;
        validate_port(self.api_port, "api_port")?;
        validate_mtu(self.mtu)?;
        for dns in &self.dns_servers {
            if dns.parse::<IpAddr>().is_err() {
                return Err(ConfigError::InvalidField {
                    field: "dns_servers",
                    reason: format!("{dns:?} is not a valid IP address"),
                });
            }
        }
        validate_interface_name(&self.interface_name)?;
        validate_log_level(&self.log_level)?;
        Ok(())
    }

    /// The engine log level as a typed value. Call after [`Self::validate`].
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_str(&self.log_level).unwrap_or_default()
    }
}

impl ClientConfig {
    /// Checks that all required fields are present and valid.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.is_empty() {
            return Err(ConfigError::MissingField("private_key"));
        }
        validate_base64_key(&self.private_key, "private_key")?;
        if self.server.is_empty() {
            return Err(ConfigError::MissingField("server"));
        }
        if !self.server_public_key.is_empty() {
            validate_base64_key(&self.server_public_key, "server_public_key")?;
        }
        validate_port(self.api_port, "api_port")?;
        validate_mtu(self.mtu)?;
        if !self.dns.is_empty() && self.dns.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidField {
                field: "dns",
                reason: format!("{:?} is not a valid IP address", self.dns),
            });
        }
        validate_interface_name(&self.interface_name)?;
        validate_log_level(&self.log_level)?;
        Ok(())
    }

    /// The engine log level as a typed value. Call after [`Self::validate`].
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_str(&self.log_level).unwrap_or_default()
    }
}

fn validate_base64_key(key: &str, field: &'static str) -> Result<(), ConfigError> {
    // Private and public keys share the same shape; the alphabet and
    // 32-byte length checks apply to both.
    PublicKey::from_base64(key)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

fn validate_port(port: u16, field: &'static str) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidField {
            field,
            reason: "must be between 1 and 65535".to_string(),
        });
    }
    Ok(())
}

fn validate_mtu(mtu: u16) -> Result<(), ConfigError> {
    if mtu < 576 {
        return Err(ConfigError::InvalidField {
            field: "mtu",
            reason: format!("must be between 576 and 65535, got {mtu}"),
        });
    }
    Ok(())
}

fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
    if !IFACE_NAME_REGEX.is_match(name) {
        return Err(ConfigError::InvalidField {
            field: "interface_name",
            reason: format!(
                "{name:?} must be 1-15 alphanumeric characters, hyphens, underscores, or dots"
            ),
        });
    }
    Ok(())
}

fn validate_log_level(level: &str) -> Result<(), ConfigError> {
    LogLevel::from_str(level).map(|_| ()).map_err(|_| {
        ConfigError::InvalidField {
            field: "log_level",
            reason: format!("{level:?} must be one of: verbose, error, silent"),
        }
    })
}
