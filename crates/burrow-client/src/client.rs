//! Client orchestrator: register, bring the tunnel up, take over the
//! default route, and put everything back on disconnect.
//!
//! Nothing from the server's response is trusted until it validates: the
//! assigned address must parse as CIDR, the server key must be a real
//! 32-byte key, the endpoint must split into host and port, and every
//! advertised DNS server must be an IP. A response failing any of these
//! aborts the connect before a TUN device exists.

use std::net::IpAddr;

use parking_lot::Mutex;
use tracing::{info, warn};

use burrow_config::ClientConfig;
use burrow_netconf::{host_configurator, InterfaceConfigurator};
use burrow_proto::RegisterResponse;
use burrow_wireguard::{
    base64_to_hex, LogLevel, PrivateKey, PublicKey, Tunnel, UapiPeer, WireGuardDevice,
    WireGuardError,
};

use crate::error::ClientError;
use crate::register::register;

/// Creates the WireGuard device for a tunnel. The seam exists so tests can
/// run the orchestrator against an in-memory device.
pub type DeviceFactory =
    Box<dyn Fn(&str, u16, LogLevel) -> Result<Box<dyn WireGuardDevice>, WireGuardError> + Send + Sync>;

fn default_device_factory() -> DeviceFactory {
    Box::new(|name, mtu, log_level| {
        burrow_wireguard::BoringtunDevice::create(name, mtu, log_level)
            .map(|device| Box::new(device) as Box<dyn WireGuardDevice>)
    })
}

/// The VPN client.
pub struct VpnClient {
    cfg: ClientConfig,
    netconf: Box<dyn InterfaceConfigurator>,
    device_factory: DeviceFactory,
    tunnel: Option<Tunnel>,
    connected: Mutex<bool>,
}

impl VpnClient {
    /// Creates a client for this host using the real device and platform
    /// configurator.
    #[must_use]
    pub fn new(cfg: ClientConfig) -> Self {
        Self::with_parts(cfg, host_configurator(), default_device_factory())
    }

    /// Creates a client with injected host-network and device bindings.
    #[must_use]
    pub fn with_parts(
        cfg: ClientConfig,
        netconf: Box<dyn InterfaceConfigurator>,
        device_factory: DeviceFactory,
    ) -> Self {
        Self {
            cfg,
            netconf,
            device_factory,
            tunnel: None,
            connected: Mutex::new(false),
        }
    }

    /// Registers with the server, brings the tunnel up, and redirects host
    /// traffic through it.
    ///
    /// Route takeover failure is logged but not fatal; the tunnel stays
    /// usable for traffic addressed to it directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material is invalid, registration fails,
    /// the response fails validation, or the tunnel cannot be configured.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let private_key = PrivateKey::from_base64(&self.cfg.private_key)?;
        let public_key_b64 = private_key.public_key().to_base64();
        info!(public_key = %public_key_b64, "derived client public key");

        let api_url = self.cfg.server_api_url();
        let api_key = if self.cfg.api_key.is_empty() {
            None
        } else {
            Some(self.cfg.api_key.as_str())
        };

        info!(url = %api_url, "registering with server");
        let response = register(&api_url, &public_key_b64, api_key).await?;
        validate_response(&response)?;
        info!(assigned_ip = %response.assigned_ip, "registered successfully");

        self.cfg.server_public_key = response.server_public_key.clone();
        self.cfg.address = response.assigned_ip.clone();
        let server_endpoint = response.server_endpoint.clone();

        let device = (self.device_factory)(
            &self.cfg.interface_name,
            self.cfg.mtu,
            self.cfg.log_level(),
        )?;
        let tunnel = Tunnel::new(device);
        info!(iface = %tunnel.name(), "created TUN device");

        let private_key_hex = private_key.to_hex();
        let server_key_hex = match base64_to_hex(&self.cfg.server_public_key) {
            Ok(hex) => hex,
            Err(e) => {
                tunnel.close();
                return Err(e.into());
            }
        };

        let mut peer = UapiPeer::new(server_key_hex);
        peer.endpoint = Some(server_endpoint.clone());
        peer.allowed_ips = vec!["0.0.0.0/0".to_string()];
        peer.persistent_keepalive = self.cfg.persistent_keepalive;

        let config = burrow_wireguard::uapi::client_config(&private_key_hex, &peer);
        if let Err(e) = tunnel.configure(&config) {
            tunnel.close();
            return Err(e.into());
        }

        if let Err(e) = tunnel.up() {
            tunnel.close();
            return Err(e.into());
        }
        info!("WireGuard device is up");

        if let Err(e) = self.configure_network(tunnel.name().to_string(), &server_endpoint) {
            tunnel.close();
            return Err(e);
        }

        self.tunnel = Some(tunnel);
        *self.connected.lock() = true;
        info!("VPN connected");
        Ok(())
    }

    fn configure_network(
        &mut self,
        iface: String,
        server_endpoint: &str,
    ) -> Result<(), ClientError> {
        self.netconf.assign_address(&iface, &self.cfg.address)?;
        info!(address = %self.cfg.address, iface = %iface, "assigned address");

        self.netconf.set_mtu(&iface, self.cfg.mtu)?;
        self.netconf.set_interface_up(&iface)?;

        let gateway = extract_gateway(&self.cfg.address).unwrap_or_default();
        if let Err(e) = self
            .netconf
            .set_default_route(&iface, &gateway, server_endpoint)
        {
            warn!(error = %e, "failed to set default route; traffic will not be redirected");
        }

        Ok(())
    }

    /// Tears the tunnel down and restores the saved default route.
    /// Idempotent: calls while disconnected are no-ops.
    pub fn disconnect(&mut self) {
        {
            let mut connected = self.connected.lock();
            if !*connected {
                return;
            }
            *connected = false;
        }
        info!("disconnecting VPN");

        if let Some(tunnel) = self.tunnel.take() {
            let iface = tunnel.name().to_string();
            if let Err(e) = self.netconf.remove_default_route(&iface) {
                warn!(error = %e, "failed to restore default route");
            }
            tunnel.close();
            info!("tunnel closed");
        }

        info!("VPN disconnected");
    }

    /// Whether the client currently holds an up tunnel.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }
}

impl Drop for VpnClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Checks every field of the server's response before it is used to
/// reconfigure the local host.
fn validate_response(response: &RegisterResponse) -> Result<(), ClientError> {
    if response.assigned_ip.parse::<ipnet::Ipv4Net>().is_err() {
        return Err(ClientError::InvalidResponse(format!(
            "assigned_ip {:?} is not valid CIDR",
            response.assigned_ip
        )));
    }
    if PublicKey::from_base64(&response.server_public_key).is_err() {
        return Err(ClientError::InvalidResponse(
            "server_public_key is not a valid key".to_string(),
        ));
    }
    match response.server_endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => {
            return Err(ClientError::InvalidResponse(format!(
                "server_endpoint {:?} is not a valid host:port",
                response.server_endpoint
            )));
        }
    }
    for dns in &response.dns_servers {
        if dns.parse::<IpAddr>().is_err() {
            return Err(ClientError::InvalidResponse(format!(
                "dns_server {dns:?} is not a valid IP address"
            )));
        }
    }
    Ok(())
}

/// Derives the tunnel gateway from an assigned CIDR address: the first
/// three octets with a final `.1`, e.g. `10.0.0.2/24` → `10.0.0.1`.
fn extract_gateway(address: &str) -> Option<String> {
    let ip_part = address.split('/').next()?;
    let ip: std::net::Ipv4Addr = ip_part.parse().ok()?;
    let octets = ip.octets();
    Some(format!("{}.{}.{}.1", octets[0], octets[1], octets[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_response() -> RegisterResponse {
        RegisterResponse {
            assigned_ip: "10.0.0.2/24".to_string(),
            server_public_key: burrow_wireguard::generate_keypair().1.to_base64(),
            server_endpoint: "1.2.3.4:51820".to_string(),
            dns_servers: vec!["1.1.1.1".to_string()],
            mtu: 1420,
        }
    }

    #[test]
    fn valid_response_passes() {
        validate_response(&valid_response()).expect("valid");
    }

    #[test]
    fn rejects_bad_assigned_ip() {
        let response = RegisterResponse {
            assigned_ip: "not-a-cidr".to_string(),
            ..valid_response()
        };
        let err = validate_response(&response).unwrap_err();
        assert!(err.to_string().contains("invalid registration response"));
    }

    #[test]
    fn rejects_bad_server_key() {
        let response = RegisterResponse {
            server_public_key: "AAAA".to_string(),
            ..valid_response()
        };
        assert!(validate_response(&response).is_err());
    }

    #[test]
    fn rejects_bad_endpoint() {
        for endpoint in ["no-port", ":51820", "host:", "host:notaport"] {
            let response = RegisterResponse {
                server_endpoint: endpoint.to_string(),
                ..valid_response()
            };
            assert!(
                validate_response(&response).is_err(),
                "accepted endpoint {endpoint:?}"
            );
        }
    }

    #[test]
    fn rejects_bad_dns_entry() {
        let response = RegisterResponse {
            dns_servers: vec!["1.1.1.1".to_string(), "dns.example.com".to_string()],
            ..valid_response()
        };
        assert!(validate_response(&response).is_err());
    }

    #[test]
    fn gateway_extraction() {
        assert_eq!(extract_gateway("10.0.0.2/24").as_deref(), Some("10.0.0.1"));
        assert_eq!(
            extract_gateway("192.168.7.200/16").as_deref(),
            Some("192.168.7.1")
        );
        assert_eq!(extract_gateway("garbage"), None);
    }
}
