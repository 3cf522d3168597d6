//! Curve25519 key types and codecs.
//!
//! WireGuard identifies every party by a 32-byte Curve25519 key. Keys move
//! through three encodings: raw bytes, base64 (wire protocol and config
//! files), and lowercase hex (the UAPI device grammar). Private keys are
//! clamped per the Curve25519 rules before use.

use std::fmt;

use base64::Engine;
use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::WireGuardError;

/// WireGuard key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

/// Applies WireGuard clamping to a private key in place.
///
/// Clears the three low bits of the first byte and the high bit of the last
/// byte, and sets bit 6 of the last byte. Applying it twice is the same as
/// applying it once.
pub fn clamp(key: &mut [u8; KEY_SIZE]) {
    key[0] &= 0xF8;
    key[31] &= 0x7F;
    key[31] |= 0x40;
}

fn decode_base64(s: &str) -> Result<[u8; KEY_SIZE], WireGuardError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| WireGuardError::InvalidBase64(e.to_string()))?;
    if bytes.len() != KEY_SIZE {
        return Err(WireGuardError::InvalidKeyLength(bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn decode_hex(s: &str) -> Result<[u8; KEY_SIZE], WireGuardError> {
    let bytes = hex::decode(s).map_err(|e| WireGuardError::InvalidHex(e.to_string()))?;
    if bytes.len() != KEY_SIZE {
        return Err(WireGuardError::InvalidKeyLength(bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// A WireGuard public key (Curve25519, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a public key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireGuardError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireGuardError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the raw bytes of the public key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64 (standard alphabet, padded).
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a public key from base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or decodes to the
    /// wrong length.
    pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
        decode_base64(s).map(Self)
    }

    /// Encodes the key as lowercase hex for the UAPI grammar.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a public key from hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex or decodes to the
    /// wrong length.
    pub fn from_hex(s: &str) -> Result<Self, WireGuardError> {
        decode_hex(s).map(Self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        let short = &b64[..8.min(b64.len())];
        write!(f, "PublicKey({short}...)")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// A WireGuard private key (Curve25519, 32 bytes, clamped on generation).
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key from the OS CSPRNG and clamps it.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        clamp(&mut bytes);
        Self(bytes)
    }

    /// Creates a private key from a 32-byte array.
    ///
    /// The bytes are taken as-is; callers loading externally generated keys
    /// are expected to hand in already-clamped material.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a private key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireGuardError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireGuardError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the raw bytes of the private key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives the corresponding public key via X25519 basepoint
    /// multiplication. Deterministic: the same private key always yields the
    /// same public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        let public = X25519PublicKey::from(&secret);
        PublicKey::from_bytes_array(*public.as_bytes())
    }

    /// Encodes the key as base64 (standard alphabet, padded).
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a private key from base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or decodes to the
    /// wrong length.
    pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
        decode_base64(s).map(Self)
    }

    /// Encodes the key as lowercase hex for the UAPI grammar.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a private key from hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex or decodes to the
    /// wrong length.
    pub fn from_hex(s: &str) -> Result<Self, WireGuardError> {
        decode_hex(s).map(Self)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// A WireGuard key pair (private + derived public).
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let private = PrivateKey::generate();
        let public = private.public_key();
        Self { private, public }
    }

    /// Creates a key pair from an existing private key.
    #[must_use]
    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Returns a reference to the private key.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Returns a reference to the public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

/// Generates a new WireGuard keypair.
#[must_use]
pub fn generate_keypair() -> (PrivateKey, PublicKey) {
    let private = PrivateKey::generate();
    let public = private.public_key();
    (private, public)
}

/// Converts a base64-encoded key to lowercase hex.
///
/// # Errors
///
/// Returns an error if the input is not valid base64 or the wrong length.
pub fn base64_to_hex(b64: &str) -> Result<String, WireGuardError> {
    decode_base64(b64).map(hex::encode)
}

/// Converts a hex-encoded key to base64.
///
/// # Errors
///
/// Returns an error if the input is not valid hex or the wrong length.
pub fn hex_to_base64(hex_str: &str) -> Result<String, WireGuardError> {
    decode_hex(hex_str).map(|k| base64::engine::general_purpose::STANDARD.encode(k))
}
