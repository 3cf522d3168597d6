//! CIDR to dotted-netmask conversion for platforms whose tooling predates
//! prefix notation.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{NetconfError, Result};

/// Splits a CIDR into its address and the dotted netmask for its real
/// prefix length, e.g. `10.0.0.1/24` → (`10.0.0.1`, `255.255.255.0`).
///
/// # Errors
///
/// Returns an error if the string is not valid IPv4 CIDR.
pub fn split_cidr(cidr: &str) -> Result<(Ipv4Addr, Ipv4Addr)> {
    let net: Ipv4Net = cidr
        .parse()
        .map_err(|_| NetconfError::InvalidCidr(cidr.to_string()))?;
    Ok((net.addr(), net.netmask()))
}

/// Dotted netmask for the prefix lengths macOS `ifconfig` setups commonly
/// use. Other lengths are rejected rather than silently approximated.
///
/// # Errors
///
/// Returns an error for prefix lengths other than /8, /16, /24, /32.
pub fn dotted_netmask(prefix_len: u8) -> Result<Ipv4Addr> {
    match prefix_len {
        8 => Ok(Ipv4Addr::new(255, 0, 0, 0)),
        16 => Ok(Ipv4Addr::new(255, 255, 0, 0)),
        24 => Ok(Ipv4Addr::new(255, 255, 255, 0)),
        32 => Ok(Ipv4Addr::new(255, 255, 255, 255)),
        other => Err(NetconfError::UnsupportedPrefix(other)),
    }
}
