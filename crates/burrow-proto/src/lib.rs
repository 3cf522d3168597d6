//! Wire types for the Burrow registration protocol.
//!
//! The registration exchange is a single HTTP round trip: the client POSTs
//! its public key to `/api/v1/register` and receives its tunnel assignment
//! plus the server's peering parameters. Both sides serialize these types
//! with serde, so the JSON field names here are the protocol.

use serde::{Deserialize, Serialize};

/// Path of the registration endpoint, relative to the API base URL.
pub const REGISTER_PATH: &str = "/api/v1/register";

/// Request body for client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// The client's WireGuard public key, base64-encoded.
    pub public_key: String,
}

/// Response returned to the client after successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The tunnel address assigned to the client, in CIDR form.
    pub assigned_ip: String,
    /// The server's WireGuard public key, base64-encoded.
    pub server_public_key: String,
    /// The server's WireGuard endpoint as `host:port`.
    pub server_endpoint: String,
    /// DNS servers the client should use inside the tunnel.
    pub dns_servers: Vec<String>,
    /// MTU the client should apply to its tunnel interface.
    pub mtu: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_json_shape() {
        let req = RegisterRequest {
            public_key: "AAAA".to_string(),
        };
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json, serde_json::json!({"public_key": "AAAA"}));
    }

    #[test]
    fn register_response_roundtrip() {
        let resp = RegisterResponse {
            assigned_ip: "10.0.0.2/24".to_string(),
            server_public_key: "BBBB".to_string(),
            server_endpoint: "1.2.3.4:51820".to_string(),
            dns_servers: vec!["1.1.1.1".to_string()],
            mtu: 1420,
        };
        let json = serde_json::to_string(&resp).expect("serialize");
        let parsed: RegisterResponse = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.assigned_ip, "10.0.0.2/24");
        assert_eq!(parsed.mtu, 1420);
    }

    #[test]
    fn register_response_field_names() {
        let json = r#"{
            "assigned_ip": "10.0.0.5/24",
            "server_public_key": "k",
            "server_endpoint": "vpn.example.com:51820",
            "dns_servers": ["1.1.1.1", "8.8.8.8"],
            "mtu": 1380
        }"#;
        let resp: RegisterResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(resp.server_endpoint, "vpn.example.com:51820");
        assert_eq!(resp.dns_servers.len(), 2);
    }
}
