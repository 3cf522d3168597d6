//! WireGuard UAPI configuration builder.
//!
//! The userspace device is configured with newline-terminated `key=value`
//! text. Three forms exist: a full server configuration (device keys plus
//! peers), a full client configuration (device key plus exactly one peer),
//! and an add-peer delta that appends a single peer without disturbing the
//! device's existing configuration. This module only produces text; it never
//! touches a socket or device.

use std::fmt::Write as _;

/// A single peer block in the UAPI grammar. All keys are lowercase hex.
#[derive(Debug, Clone, Default)]
pub struct UapiPeer {
    /// The peer's public key, hex-encoded.
    pub public_key_hex: String,
    /// Optional preshared key, hex-encoded.
    pub preshared_key_hex: Option<String>,
    /// Optional endpoint as `host:port`.
    pub endpoint: Option<String>,
    /// Allowed IPs in CIDR form, emitted in order.
    pub allowed_ips: Vec<String>,
    /// Persistent keepalive interval in seconds; omitted when zero.
    pub persistent_keepalive: u16,
}

impl UapiPeer {
    /// Creates a peer block with the given hex public key and no other
    /// fields set.
    #[must_use]
    pub fn new(public_key_hex: impl Into<String>) -> Self {
        Self {
            public_key_hex: public_key_hex.into(),
            ..Self::default()
        }
    }
}

fn write_peer(out: &mut String, peer: &UapiPeer) {
    let _ = writeln!(out, "public_key={}", peer.public_key_hex);
    if let Some(ref psk) = peer.preshared_key_hex {
        let _ = writeln!(out, "preshared_key={psk}");
    }
    if let Some(ref endpoint) = peer.endpoint {
        let _ = writeln!(out, "endpoint={endpoint}");
    }
    for allowed_ip in &peer.allowed_ips {
        let _ = writeln!(out, "allowed_ip={allowed_ip}");
    }
    if peer.persistent_keepalive > 0 {
        let _ = writeln!(
            out,
            "persistent_keepalive_interval={}",
            peer.persistent_keepalive
        );
    }
}

/// Builds a full server configuration: device private key, listen port, and
/// zero or more peer blocks. Applying this replaces the device configuration.
#[must_use]
pub fn server_config(private_key_hex: &str, listen_port: u16, peers: &[UapiPeer]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "private_key={private_key_hex}");
    let _ = writeln!(out, "listen_port={listen_port}");
    for peer in peers {
        write_peer(&mut out, peer);
    }
    out
}

/// Builds a full client configuration: device private key and exactly one
/// peer block (the server).
#[must_use]
pub fn client_config(private_key_hex: &str, peer: &UapiPeer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "private_key={private_key_hex}");
    write_peer(&mut out, peer);
    out
}

/// Builds an add-peer delta: a single peer block with no device-level keys.
/// Applying this adds the peer without replacing existing configuration.
#[must_use]
pub fn add_peer(peer: &UapiPeer) -> String {
    let mut out = String::new();
    write_peer(&mut out, peer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_peer() -> UapiPeer {
        UapiPeer {
            public_key_hex: "aa".repeat(32),
            preshared_key_hex: None,
            endpoint: Some("192.0.2.1:51820".to_string()),
            allowed_ips: vec!["10.0.0.2/32".to_string()],
            persistent_keepalive: 25,
        }
    }

    #[test]
    fn server_config_without_peers() {
        let cfg = server_config(&"ab".repeat(32), 51820, &[]);
        assert!(cfg.contains(&format!("private_key={}\n", "ab".repeat(32))));
        assert!(cfg.contains("listen_port=51820\n"));
        assert!(!cfg.contains("public_key="));
        assert!(cfg.ends_with('\n'));
    }

    #[test]
    fn server_config_with_peers() {
        let cfg = server_config(&"ab".repeat(32), 51820, &[test_peer()]);
        assert!(cfg.contains(&format!("public_key={}\n", "aa".repeat(32))));
        assert!(cfg.contains("allowed_ip=10.0.0.2/32\n"));
        // Device keys come before the first peer block.
        let port_pos = cfg.find("listen_port=").expect("listen_port");
        let peer_pos = cfg.find("public_key=").expect("public_key");
        assert!(port_pos < peer_pos);
    }

    #[test]
    fn add_peer_has_no_device_keys() {
        let cfg = add_peer(&test_peer());
        assert!(cfg.contains("public_key="));
        assert!(cfg.contains("endpoint=192.0.2.1:51820\n"));
        assert!(cfg.contains("persistent_keepalive_interval=25\n"));
        assert!(!cfg.contains("private_key="));
        assert!(!cfg.contains("listen_port="));
    }

    #[test]
    fn client_config_has_exactly_one_public_key() {
        let cfg = client_config(&"cd".repeat(32), &test_peer());
        assert_eq!(cfg.matches("public_key=").count(), 1);
        assert!(cfg.starts_with(&format!("private_key={}\n", "cd".repeat(32))));
    }

    #[test]
    fn allowed_ips_emitted_in_order() {
        let mut peer = test_peer();
        peer.allowed_ips = vec![
            "10.0.0.0/24".to_string(),
            "192.168.0.0/16".to_string(),
            "0.0.0.0/0".to_string(),
        ];
        let cfg = add_peer(&peer);
        let first = cfg.find("allowed_ip=10.0.0.0/24").expect("first");
        let second = cfg.find("allowed_ip=192.168.0.0/16").expect("second");
        let third = cfg.find("allowed_ip=0.0.0.0/0").expect("third");
        assert!(first < second && second < third);
        assert_eq!(cfg.matches("allowed_ip=").count(), 3);
    }

    #[test]
    fn optional_fields_omitted() {
        let peer = UapiPeer::new("ee".repeat(32));
        let cfg = add_peer(&peer);
        assert!(!cfg.contains("preshared_key="));
        assert!(!cfg.contains("endpoint="));
        assert!(!cfg.contains("allowed_ip="));
        assert!(!cfg.contains("persistent_keepalive_interval="));
    }

    #[test]
    fn preshared_key_emitted_between_public_key_and_endpoint() {
        let mut peer = test_peer();
        peer.preshared_key_hex = Some("ff".repeat(32));
        let cfg = add_peer(&peer);
        let pk = cfg.find("public_key=").expect("public_key");
        let psk = cfg.find("preshared_key=").expect("preshared_key");
        let ep = cfg.find("endpoint=").expect("endpoint");
        assert!(pk < psk && psk < ep);
    }

    #[test]
    fn zero_keepalive_omitted() {
        let mut peer = test_peer();
        peer.persistent_keepalive = 0;
        let cfg = add_peer(&peer);
        assert!(!cfg.contains("persistent_keepalive_interval="));
    }
}
