//! End-to-end connect/disconnect against a real registration API.
//!
//! The server side runs the actual axum API over real IPAM; the client runs
//! the real orchestrator with an in-memory device and a recording
//! configurator, so the whole admission flow is exercised without touching
//! the host network.

use std::sync::Arc;

use parking_lot::Mutex;

use burrow_client::{ClientError, VpnClient};
use burrow_config::ClientConfig;
use burrow_ipam::Ipam;
use burrow_netconf::InterfaceConfigurator;
use burrow_proto::REGISTER_PATH;
use burrow_server::{PeerAddFn, RegistrationApi};
use burrow_wireguard::{generate_keypair, FakeDevice, WireGuardDevice};

#[derive(Default, Clone)]
struct Recorded {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn snapshot(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

struct RecordingConfigurator {
    ops: Recorded,
}

impl InterfaceConfigurator for RecordingConfigurator {
    fn assign_address(&mut self, iface: &str, cidr: &str) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push(format!("assign_address {iface} {cidr}"));
        Ok(())
    }

    fn set_interface_up(&mut self, iface: &str) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push(format!("set_interface_up {iface}"));
        Ok(())
    }

    fn set_mtu(&mut self, iface: &str, mtu: u16) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push(format!("set_mtu {iface} {mtu}"));
        Ok(())
    }

    fn add_route(
        &mut self,
        destination: &str,
        _gateway: Option<&str>,
        iface: &str,
    ) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push(format!("add_route {destination} {iface}"));
        Ok(())
    }

    fn set_default_route(
        &mut self,
        iface: &str,
        gateway: &str,
        server_endpoint: &str,
    ) -> burrow_netconf::Result<()> {
        self.ops
            .calls
            .lock()
            .push(format!("set_default_route {iface} {gateway} {server_endpoint}"));
        Ok(())
    }

    fn remove_default_route(&mut self, iface: &str) -> burrow_netconf::Result<()> {
        self.ops
            .calls
            .lock()
            .push(format!("remove_default_route {iface}"));
        Ok(())
    }

    fn enable_ip_forwarding(&mut self) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push("enable_ip_forwarding".to_string());
        Ok(())
    }

    fn configure_nat(&mut self, iface: &str, subnet: &str) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push(format!("configure_nat {iface} {subnet}"));
        Ok(())
    }

    fn remove_nat(&mut self, iface: &str, subnet: &str) -> burrow_netconf::Result<()> {
        self.ops.calls.lock().push(format!("remove_nat {iface} {subnet}"));
        Ok(())
    }
}

/// Serves a registration API over fresh IPAM; returns its base URL.
async fn spawn_api(api_key: Option<&str>) -> String {
    let ipam = Arc::new(Ipam::new("10.0.0.1/24").expect("ipam"));
    let on_peer_add: PeerAddFn = Arc::new(|_| Ok(()));
    let api = RegistrationApi::new(
        ipam,
        generate_keypair().1.to_base64(),
        "1.2.3.4:51820",
        vec!["1.1.1.1".to_string()],
        1420,
        api_key.map(String::from),
        on_peer_add,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let router = api.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

struct TestClient {
    client: VpnClient,
    ops: Recorded,
    device: Arc<FakeDevice>,
}

fn test_client(api_url: &str, api_key: &str) -> TestClient {
    let url: url_parts::Parts = url_parts::split(api_url);
    let cfg = ClientConfig {
        server: url.host,
        api_port: url.port,
        private_key: generate_keypair().0.to_base64(),
        api_key: api_key.to_string(),
        ..ClientConfig::default()
    };

    let ops = Recorded::default();
    let device = Arc::new(FakeDevice::new("wg0"));
    let shared = Arc::clone(&device);

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

    let client = VpnClient::with_parts(
        cfg,
        Box::new(RecordingConfigurator { ops: ops.clone() }),
        Box::new(move |_, _, _| Ok(Box::new(SharedFake(Arc::clone(&shared))) as Box<dyn WireGuardDevice>)),
    );

    TestClient {
        client,
        ops,
        device,
    }
}

/// Minimal `http://host:port` splitter for test URLs.
mod url_parts {
    pub struct Parts {
        pub host: String,
        pub port: u16,
    }

    pub fn split(url: &str) -> Parts {
        let rest = url.strip_prefix("http://").expect("http url");
        let (host, port) = rest.rsplit_once(':').expect("host:port");
        Parts {
            host: host.to_string(),
            port: port.parse().expect("port"),
        }
    }
}

#[tokio::test]
async fn connect_brings_up_tunnel_and_routes() {
    let url = spawn_api(None).await;
    let mut t = test_client(&url, "");

    t.client.connect().await.expect("connect");
    assert!(t.client.is_connected());

    // One full client configuration was pushed and the device is up.
    let pushes = t.device.uapi_pushes();
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0].contains("private_key="));
    assert_eq!(pushes[0].matches("public_key=").count(), 1);
    assert!(pushes[0].contains("allowed_ip=0.0.0.0/0\n"));
    assert!(pushes[0].contains("endpoint=1.2.3.4:51820\n"));
    assert!(pushes[0].contains("persistent_keepalive_interval=25\n"));
    assert!(t.device.is_up());

    // Host network configured in order, with the derived gateway.
    let calls = t.ops.snapshot();
    assert!(calls[0].starts_with("assign_address wg0 10.0.0."));
    assert!(calls[0].ends_with("/24"));
    assert_eq!(calls[1], "set_mtu wg0 1420");
    assert_eq!(calls[2], "set_interface_up wg0");
    assert_eq!(calls[3], "set_default_route wg0 10.0.0.1 1.2.3.4:51820");

    t.client.disconnect();
    assert!(!t.client.is_connected());
    assert!(t.device.is_closed());
    let calls = t.ops.snapshot();
    assert_eq!(calls.last().map(String::as_str), Some("remove_default_route wg0"));
}

#[tokio::test]
async fn connect_with_api_key() {
    let url = spawn_api(Some("s3cret")).await;

    let mut rejected = test_client(&url, "wrong");
    let err = rejected.client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 401, .. }));
    assert!(!rejected.client.is_connected());
    // No TUN device was ever created.
    assert!(rejected.device.uapi_pushes().is_empty());

    let mut accepted = test_client(&url, "s3cret");
    accepted.client.connect().await.expect("connect");
    assert!(accepted.client.is_connected());
    accepted.client.disconnect();
}

#[tokio::test]
async fn invalid_registration_response_aborts_before_tunnel() {
    use axum::routing::post;
    use axum::{Json, Router};

    let router = Router::new().route(
        REGISTER_PATH,
        post(|| async {
            Json(serde_json::json!({
                "assigned_ip": "not-a-cidr",
                "server_public_key": generate_keypair().1.to_base64(),
                "server_endpoint": "1.2.3.4:51820",
                "dns_servers": [],
                "mtu": 1420,
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    let mut t = test_client(&format!("http://{addr}"), "");
    let err = t.client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
    assert!(t.device.uapi_pushes().is_empty());
    assert!(!t.device.is_up());
    assert!(t.ops.snapshot().is_empty());
}

#[tokio::test]
async fn disconnect_without_connect_is_noop() {
    let url = spawn_api(None).await;
    let mut t = test_client(&url, "");
    t.client.disconnect();
    t.client.disconnect();
    assert!(!t.client.is_connected());
    assert!(t.ops.snapshot().is_empty());
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let url = spawn_api(None).await;

    let mut first = test_client(&url, "");
    first.client.connect().await.expect("connect");
    let first_addr = first
        .ops
        .snapshot()
        .first()
        .cloned()
        .expect("assign_address call");
    first.client.disconnect();

    // Same key re-registers and receives the same address.
    let mut second = test_client(&url, "");
    second.client.connect().await.expect("connect");
    let second_addr = second
        .ops
        .snapshot()
        .first()
        .cloned()
        .expect("assign_address call");
    // Different keys, so different addresses; both in the subnet.
    assert_ne!(first_addr, second_addr);
    second.client.disconnect();
}
