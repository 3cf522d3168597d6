//! Input validation applied before anything is passed to an OS command.
//!
//! Every configurator entry point validates its inputs here first, so a
//! hostile interface name or address can never reach a shell-out.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{NetconfError, Result};

/// Safe interface names: leading alphanumeric, then alphanumerics, dots,
/// underscores, or hyphens, 15 chars max (the kernel IFNAMSIZ limit).
static IFACE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,14}$").unwrap_or_else(|_| unreachable!()));

/// Checks that the interface name is safe for use in OS commands.
///
/// # Errors
///
/// Returns an error if the name does not match the safe pattern.
pub fn interface_name(name: &str) -> Result<()> {
    if !IFACE_NAME_REGEX.is_match(name) {
        return Err(NetconfError::InvalidInterfaceName(name.to_string()));
    }
    Ok(())
}

/// Checks that the address parses as IPv4 CIDR notation.
///
/// # Errors
///
/// Returns an error if the string is not valid CIDR.
pub fn cidr(address: &str) -> Result<()> {
    address
        .parse::<ipnet::Ipv4Net>()
        .map(|_| ())
        .map_err(|_| NetconfError::InvalidCidr(address.to_string()))
}

/// Checks that the string parses as an IP address.
///
/// # Errors
///
/// Returns an error if the string is not a valid IP.
pub fn ip(address: &str) -> Result<()> {
    address
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| NetconfError::InvalidIp(address.to_string()))
}
