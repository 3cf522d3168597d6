//! macOS configurator: `ifconfig`, `route`, and `sysctl`.
//!
//! NAT is not automated here. macOS packet-filter NAT lives in `pf.conf`
//! and enabling it programmatically would fight whatever rules the host
//! already carries, so `configure_nat` returns an unsupported error telling
//! the operator to set up pf manually.

use tracing::warn;

use crate::command::{run, run_capture};
use crate::error::{NetconfError, Result};
use crate::mask::{dotted_netmask, split_cidr};
use crate::{endpoint_host, validate, InterfaceConfigurator};

/// Host network configuration via BSD userland tools.
#[derive(Debug, Default)]
pub struct MacosConfigurator {
    saved_gateway: Option<String>,
    saved_interface: Option<String>,
}

impl MacosConfigurator {
    /// Creates a configurator with no saved route snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `route -n get default` output into (gateway, interface).
    fn parse_default_route(output: &str) -> (Option<String>, Option<String>) {
        let mut gateway = None;
        let mut interface = None;
        for line in output.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("gateway:") {
                gateway = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("interface:") {
                interface = Some(value.trim().to_string());
            }
        }
        (gateway, interface)
    }
}

impl InterfaceConfigurator for MacosConfigurator {
    fn assign_address(&mut self, iface: &str, cidr: &str) -> Result<()> {
        validate::interface_name(iface)?;
        let (addr, _) = split_cidr(cidr)?;
        let prefix = cidr
            .rsplit('/')
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(|| NetconfError::InvalidCidr(cidr.to_string()))?;
        let mask = dotted_netmask(prefix)?;
        let addr = addr.to_string();
        let mask = mask.to_string();
        // Point-to-point style: the interface address doubles as the peer.
        run(
            "ifconfig",
            &[iface, "inet", &addr, &addr, "netmask", &mask],
        )
    }

    fn set_interface_up(&mut self, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        run("ifconfig", &[iface, "up"])
    }

    fn set_mtu(&mut self, iface: &str, mtu: u16) -> Result<()> {
        validate::interface_name(iface)?;
        run("ifconfig", &[iface, "mtu", &mtu.to_string()])
    }

    fn add_route(&mut self, destination: &str, gateway: Option<&str>, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        validate::cidr(destination)?;
        match gateway {
            Some(gw) => {
                validate::ip(gw)?;
                run("route", &["add", "-net", destination, gw])
            }
            None => run("route", &["add", "-net", destination, "-interface", iface]),
        }
    }

    fn set_default_route(
        &mut self,
        iface: &str,
        _gateway: &str,
        server_endpoint: &str,
    ) -> Result<()> {
        validate::interface_name(iface)?;

        if let Ok(out) = run_capture("route", &["-n", "get", "default"]) {
            let (gateway, interface) = Self::parse_default_route(&out);
            self.saved_gateway = gateway;
            self.saved_interface = interface;
        }

        if let Some(gw) = &self.saved_gateway {
            let host = endpoint_host(server_endpoint);
            if validate::ip(host).is_ok() {
                if let Err(e) = run("route", &["add", "-host", host, gw]) {
                    warn!(error = %e, "failed to pin server endpoint route");
                }
            }
        }

        let _ = run("route", &["delete", "default"]);
        run("route", &["add", "default", "-interface", iface])
    }

    fn remove_default_route(&mut self, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        let _ = run("route", &["delete", "default"]);

        self.saved_interface.take();
        match self.saved_gateway.take() {
            Some(gw) => run("route", &["add", "default", &gw]),
            None => Ok(()),
        }
    }

    fn enable_ip_forwarding(&mut self) -> Result<()> {
        run("sysctl", &["-w", "net.inet.ip.forwarding=1"])
    }

    fn configure_nat(&mut self, _iface: &str, _vpn_subnet: &str) -> Result<()> {
        Err(NetconfError::Unsupported(
            "NAT on macOS requires manual pf configuration".to_string(),
        ))
    }

    fn remove_nat(&mut self, _iface: &str, _vpn_subnet: &str) -> Result<()> {
        Ok(())
    }
}
