//! Error types for the VPN server.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur while starting or running the VPN server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IPAM could not be built or ran out of addresses.
    #[error(transparent)]
    Ipam(#[from] burrow_ipam::IpamError),

    /// Key handling or tunnel operation failed.
    #[error(transparent)]
    WireGuard(#[from] burrow_wireguard::WireGuardError),

    /// Host network reconfiguration failed.
    #[error(transparent)]
    Netconf(#[from] burrow_netconf::NetconfError),

    /// The API listener could not bind.
    #[error("failed to bind API listener on {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: SocketAddr,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The API server failed while serving.
    #[error("API server error: {0}")]
    Serve(std::io::Error),
}
