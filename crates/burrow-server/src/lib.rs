//! Burrow VPN server library.
//!
//! The server terminates the WireGuard tunnel, admits clients over the HTTP
//! registration API, allocates each one a tunnel address, and installs it as
//! a peer on the running device without disturbing existing peers.

pub mod api;
pub mod error;
pub mod server;

pub use api::{PeerAddFn, RegistrationApi};
pub use error::ServerError;
pub use server::VpnServer;
