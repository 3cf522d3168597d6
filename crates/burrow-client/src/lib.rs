//! Burrow VPN client library.
//!
//! The client presents its public key to the server's registration API,
//! validates the returned assignment, brings up its own tunnel device, and
//! redirects host traffic through it. Disconnecting restores the original
//! default route.

pub mod client;
pub mod error;
pub mod register;

pub use client::{DeviceFactory, VpnClient};
pub use error::ClientError;
pub use register::register;
