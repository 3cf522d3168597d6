//! WireGuard control-plane primitives for Burrow.
//!
//! This crate owns the pieces of the VPN that talk to (or stand in for) the
//! userspace WireGuard engine: Curve25519 key handling, the text-based UAPI
//! configuration grammar, and the tunnel adapter that owns one device over a
//! TUN interface. The cryptographic data path itself lives behind the
//! [`WireGuardDevice`] seam; the production binding (enabled with the
//! `device` feature) drives boringtun's device mode.

pub mod device;
pub mod error;
pub mod keys;
pub mod tunnel;
pub mod uapi;

#[cfg(all(feature = "device", unix))]
mod userspace;

pub use device::{FakeDevice, LogLevel, WireGuardDevice};
pub use error::{Result, WireGuardError};
pub use keys::{
    base64_to_hex, clamp, generate_keypair, hex_to_base64, KeyPair, PrivateKey, PublicKey,
    KEY_SIZE,
};
pub use tunnel::Tunnel;
pub use uapi::UapiPeer;

#[cfg(all(feature = "device", unix))]
pub use userspace::BoringtunDevice;
