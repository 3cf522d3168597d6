//! Server orchestrator: wires IPAM, the tunnel, the host network, and the
//! registration API together.
//!
//! Startup is strictly ordered and unwinds on failure: IPAM, then the
//! tunnel device, then its initial UAPI configuration, then host network
//! setup, then the API. Peers admitted at runtime are installed with delta
//! UAPI fragments so the device's existing configuration is never replaced.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use burrow_config::ServerConfig;
use burrow_ipam::Ipam;
use burrow_netconf::{host_configurator, InterfaceConfigurator};
use burrow_wireguard::{base64_to_hex, uapi, LogLevel, Tunnel, WireGuardDevice, WireGuardError};

use crate::api::{PeerAddFn, RegistrationApi};
use crate::error::ServerError;

/// How long the API is given to drain in-flight requests at shutdown.
const API_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

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

/// The VPN server.
pub struct VpnServer {
    cfg: ServerConfig,
    netconf: Box<dyn InterfaceConfigurator>,
    device_factory: DeviceFactory,
    tunnel: Option<Arc<Tunnel>>,
    ipam: Option<Arc<Ipam>>,
    api_shutdown: Option<oneshot::Sender<()>>,
    api_task: Option<JoinHandle<()>>,
}

impl VpnServer {
    /// Creates a server for this host using the real device and platform
    /// configurator.
    #[must_use]
    pub fn new(cfg: ServerConfig) -> Self {
        Self::with_parts(cfg, host_configurator(), default_device_factory())
    }

    /// Creates a server with injected host-network and device bindings.
    #[must_use]
    pub fn with_parts(
        cfg: ServerConfig,
        netconf: Box<dyn InterfaceConfigurator>,
        device_factory: DeviceFactory,
    ) -> Self {
        Self {
            cfg,
            netconf,
            device_factory,
            tunnel: None,
            ipam: None,
            api_shutdown: None,
            api_task: None,
        }
    }

    /// Starts all server components in order. A failure at any step unwinds
    /// the steps already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if IPAM, the tunnel, its configuration, or the host
    /// network setup fails, or the API listener cannot bind.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        let ipam = Arc::new(Ipam::new(&self.cfg.address)?);

        let device = (self.device_factory)(
            &self.cfg.interface_name,
            self.cfg.mtu,
            self.cfg.log_level(),
        )?;
        let tunnel = Arc::new(Tunnel::new(device));
        info!(iface = %tunnel.name(), "created TUN device");

        let private_key_hex = match base64_to_hex(&self.cfg.private_key) {
            Ok(hex) => hex,
            Err(e) => {
                tunnel.close();
                return Err(e.into());
            }
        };

        let initial = uapi::server_config(&private_key_hex, self.cfg.listen_port, &[]);
        if let Err(e) = tunnel.configure(&initial) {
            tunnel.close();
            return Err(e.into());
        }

        if let Err(e) = tunnel.up() {
            tunnel.close();
            return Err(e.into());
        }
        info!("WireGuard device is up");

        if let Err(e) = self.configure_network(tunnel.name().to_string()) {
            tunnel.close();
            return Err(e);
        }

        let server_endpoint = format!("{}:{}", self.cfg.external_host, self.cfg.listen_port);
        let api_key = if self.cfg.api_key.is_empty() {
            None
        } else {
            Some(self.cfg.api_key.clone())
        };

        let peer_tunnel = Arc::clone(&tunnel);
        let on_peer_add: PeerAddFn = Arc::new(move |peer| {
            let delta = uapi::add_peer(&peer);
            peer_tunnel.configure(&delta)
        });

        let api = RegistrationApi::new(
            Arc::clone(&ipam),
            self.cfg.public_key.clone(),
            server_endpoint,
            self.cfg.dns_servers.clone(),
            self.cfg.mtu,
            api_key,
            on_peer_add,
        );

        let api_addr = SocketAddr::from(([0, 0, 0, 0], self.cfg.api_port));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let api_task = tokio::spawn(async move {
            let result = api
                .serve_with_shutdown(api_addr, async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "API server error");
            }
        });

        self.tunnel = Some(tunnel);
        self.ipam = Some(ipam);
        self.api_shutdown = Some(shutdown_tx);
        self.api_task = Some(api_task);

        info!(
            wg_port = self.cfg.listen_port,
            api_port = self.cfg.api_port,
            "VPN server started"
        );
        Ok(())
    }

    fn configure_network(&mut self, iface: String) -> Result<(), ServerError> {
        self.netconf.assign_address(&iface, &self.cfg.address)?;
        info!(address = %self.cfg.address, iface = %iface, "assigned address");

        self.netconf.set_mtu(&iface, self.cfg.mtu)?;
        self.netconf.set_interface_up(&iface)?;

        if let Err(e) = self.netconf.enable_ip_forwarding() {
            warn!(error = %e, "failed to enable IP forwarding");
        }

        let subnet = self.vpn_subnet();
        if let Err(e) = self.netconf.configure_nat(&iface, &subnet) {
            warn!(error = %e, "failed to configure NAT");
        }

        Ok(())
    }

    /// The allocation subnet in network form, e.g. `10.0.0.1/24` →
    /// `10.0.0.0/24`.
    fn vpn_subnet(&self) -> String {
        self.cfg
            .address
            .parse::<ipnet::Ipv4Net>()
            .map(|net| net.trunc().to_string())
            .unwrap_or_else(|_| self.cfg.address.clone())
    }

    /// Gracefully shuts the server down: drains the API, removes NAT, and
    /// closes the tunnel. Forwarding is deliberately left enabled; it is a
    /// host-wide toggle other services may rely on.
    pub async fn stop(&mut self) {
        info!("stopping VPN server");

        if let Some(shutdown) = self.api_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.api_task.take() {
            if tokio::time::timeout(API_SHUTDOWN_TIMEOUT, task).await.is_err() {
                warn!("API server did not drain within the shutdown timeout");
            } else {
                info!("API server stopped");
            }
        }

        if let Some(tunnel) = self.tunnel.take() {
            let iface = tunnel.name().to_string();
            let subnet = self.vpn_subnet();
            if let Err(e) = self.netconf.remove_nat(&iface, &subnet) {
                warn!(error = %e, "failed to remove NAT");
            }

            tunnel.close();
            info!("tunnel closed");
        }

        self.ipam = None;
        info!("VPN server stopped");
    }

    /// The IPAM instance, once started.
    #[must_use]
    pub fn ipam(&self) -> Option<Arc<Ipam>> {
        self.ipam.clone()
    }

    /// The tunnel, once started.
    #[must_use]
    pub fn tunnel(&self) -> Option<Arc<Tunnel>> {
        self.tunnel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_wireguard::FakeDevice;
    use parking_lot::Mutex;

    #[derive(Debug, Default, Clone)]
    struct RecordedOps {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordedOps {
        fn push(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn snapshot(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    struct RecordingConfigurator {
        ops: RecordedOps,
    }

    impl InterfaceConfigurator for RecordingConfigurator {
        fn assign_address(&mut self, iface: &str, cidr: &str) -> burrow_netconf::Result<()> {
            self.ops.push(format!("assign_address {iface} {cidr}"));
            Ok(())
        }

        fn set_interface_up(&mut self, iface: &str) -> burrow_netconf::Result<()> {
            self.ops.push(format!("set_interface_up {iface}"));
            Ok(())
        }

        fn set_mtu(&mut self, iface: &str, mtu: u16) -> burrow_netconf::Result<()> {
            self.ops.push(format!("set_mtu {iface} {mtu}"));
            Ok(())
        }

        fn add_route(
            &mut self,
            destination: &str,
            _gateway: Option<&str>,
            iface: &str,
        ) -> burrow_netconf::Result<()> {
            self.ops.push(format!("add_route {destination} {iface}"));
            Ok(())
        }

        fn set_default_route(
            &mut self,
            iface: &str,
            _gateway: &str,
            _server_endpoint: &str,
        ) -> burrow_netconf::Result<()> {
            self.ops.push(format!("set_default_route {iface}"));
            Ok(())
        }

        fn remove_default_route(&mut self, iface: &str) -> burrow_netconf::Result<()> {
            self.ops.push(format!("remove_default_route {iface}"));
            Ok(())
        }

        fn enable_ip_forwarding(&mut self) -> burrow_netconf::Result<()> {
            self.ops.push("enable_ip_forwarding");
            Ok(())
        }

        fn configure_nat(&mut self, iface: &str, subnet: &str) -> burrow_netconf::Result<()> {
            self.ops.push(format!("configure_nat {iface} {subnet}"));
            Ok(())
        }

        fn remove_nat(&mut self, iface: &str, subnet: &str) -> burrow_netconf::Result<()> {
            self.ops.push(format!("remove_nat {iface} {subnet}"));
            Ok(())
        }
    }

    fn test_config() -> ServerConfig {
        let (private, public) = burrow_wireguard::generate_keypair();
        ServerConfig {
            private_key: private.to_base64(),
            public_key: public.to_base64(),
            external_host: "1.2.3.4".to_string(),
            api_port: 0, // ephemeral port for tests
            ..ServerConfig::default()
        }
    }

    fn fake_factory() -> DeviceFactory {
        Box::new(|name, _mtu, _log_level| {
            Ok(Box::new(FakeDevice::new(name)) as Box<dyn WireGuardDevice>)
        })
    }

    #[tokio::test]
    async fn start_configures_device_and_network() {
        let ops = RecordedOps::default();
        let mut server = VpnServer::with_parts(
            test_config(),
            Box::new(RecordingConfigurator { ops: ops.clone() }),
            fake_factory(),
        );

        server.start().await.expect("start");

        let calls = ops.snapshot();
        assert_eq!(calls[0], "assign_address wg0 10.0.0.1/24");
        assert_eq!(calls[1], "set_mtu wg0 1420");
        assert_eq!(calls[2], "set_interface_up wg0");
        assert_eq!(calls[3], "enable_ip_forwarding");
        assert_eq!(calls[4], "configure_nat wg0 10.0.0.0/24");

        let tunnel = server.tunnel().expect("tunnel");
        assert_eq!(tunnel.name(), "wg0");

        server.stop().await;
    }

    #[tokio::test]
    async fn initial_uapi_has_device_keys_and_no_peers() {
        let cfg = test_config();
        let expected_key_hex = base64_to_hex(&cfg.private_key).expect("hex");

        let device = Arc::new(FakeDevice::new("wg0"));
        let push_source = Arc::clone(&device);
        // Factory hands out a tunnel around the shared fake so the test can
        // inspect pushes afterwards.
        let factory: DeviceFactory = Box::new(move |_, _, _| {
            Ok(Box::new(SharedFake(Arc::clone(&push_source))) as Box<dyn WireGuardDevice>)
        });

        struct SharedFake(Arc<FakeDevice>);
        impl WireGuardDevice for SharedFake {
            fn apply_uapi(&self, config: &str) -> burrow_wireguard::Result<()> {
                self.0.apply_uapi(config)
            }
            fn up(&self) -> burrow_wireguard::Result<()> {
                self.0.up()
            }
            fn down(&self) -> burrow_wireguard::Result<()> {
                self.0.down()
            }
            fn close(&self) {
                self.0.close();
            }
            fn name(&self) -> &str {
                self.0.name()
            }
        }

        let ops = RecordedOps::default();
        let mut server = VpnServer::with_parts(
            cfg,
            Box::new(RecordingConfigurator { ops }),
            factory,
        );
        server.start().await.expect("start");

        let pushes = device.uapi_pushes();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].contains(&format!("private_key={expected_key_hex}\n")));
        assert!(pushes[0].contains("listen_port=51820\n"));
        assert!(!pushes[0].contains("public_key="));
        assert!(device.is_up());

        server.stop().await;
        assert!(device.is_closed());
    }

    #[tokio::test]
    async fn invalid_address_aborts_start() {
        let cfg = ServerConfig {
            address: "10.0.0.1/8".to_string(), // prefix too short
            ..test_config()
        };
        let ops = RecordedOps::default();
        let mut server = VpnServer::with_parts(
            cfg,
            Box::new(RecordingConfigurator { ops: ops.clone() }),
            fake_factory(),
        );
        assert!(matches!(
            server.start().await,
            Err(ServerError::Ipam(_))
        ));
        assert!(ops.snapshot().is_empty());
    }

    #[tokio::test]
    async fn stop_removes_nat_and_is_idempotent() {
        let ops = RecordedOps::default();
        let mut server = VpnServer::with_parts(
            test_config(),
            Box::new(RecordingConfigurator { ops: ops.clone() }),
            fake_factory(),
        );
        server.start().await.expect("start");
        server.stop().await;
        server.stop().await;

        let calls = ops.snapshot();
        let removals: Vec<_> = calls.iter().filter(|c| c.starts_with("remove_nat")).collect();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0], "remove_nat wg0 10.0.0.0/24");
    }
}
