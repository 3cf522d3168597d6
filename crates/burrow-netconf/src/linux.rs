//! Linux configurator: `ip`, `sysctl`, and `iptables`.

use tracing::warn;

use crate::command::{run, run_capture};
use crate::error::Result;
use crate::{endpoint_host, validate, InterfaceConfigurator};

/// Host network configuration via iproute2 and iptables.
#[derive(Debug, Default)]
pub struct LinuxConfigurator {
    saved_gateway: Option<String>,
    saved_interface: Option<String>,
}

impl LinuxConfigurator {
    /// Creates a configurator with no saved route snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the gateway and egress interface out of
    /// `ip route show default` output.
    ///
    /// Only the first line is considered; on hosts with several default
    /// routes the remainder are not preserved.
    fn parse_default_route(output: &str) -> Option<(String, String)> {
        let first_line = output.lines().next()?;
        let fields: Vec<&str> = first_line.split_whitespace().collect();
        // Expected shape: "default via <gw> dev <iface> ..."
        if fields.len() >= 5 && fields[0] == "default" && fields[1] == "via" && fields[3] == "dev" {
            return Some((fields[2].to_string(), fields[4].to_string()));
        }
        None
    }

    /// The egress interface of the current default route, falling back to
    /// `eth0` when none can be determined.
    fn default_outbound_interface() -> String {
        run_capture("ip", &["route", "show", "default"])
            .ok()
            .and_then(|out| Self::parse_default_route(&out))
            .map_or_else(|| "eth0".to_string(), |(_, iface)| iface)
    }
}

impl InterfaceConfigurator for LinuxConfigurator {
    fn assign_address(&mut self, iface: &str, cidr: &str) -> Result<()> {
        validate::interface_name(iface)?;
        validate::cidr(cidr)?;
        run("ip", &["addr", "add", cidr, "dev", iface])
    }

    fn set_interface_up(&mut self, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        run("ip", &["link", "set", iface, "up"])
    }

    fn set_mtu(&mut self, iface: &str, mtu: u16) -> Result<()> {
        validate::interface_name(iface)?;
        run("ip", &["link", "set", iface, "mtu", &mtu.to_string()])
    }

    fn add_route(&mut self, destination: &str, gateway: Option<&str>, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        validate::cidr(destination)?;
        match gateway {
            Some(gw) => {
                validate::ip(gw)?;
                run("ip", &["route", "add", destination, "via", gw, "dev", iface])
            }
            None => run("ip", &["route", "add", destination, "dev", iface]),
        }
    }

    fn set_default_route(
        &mut self,
        iface: &str,
        _gateway: &str,
        server_endpoint: &str,
    ) -> Result<()> {
        validate::interface_name(iface)?;

        // Snapshot the current default route for restoration at teardown.
        if let Ok(out) = run_capture("ip", &["route", "show", "default"]) {
            if let Some((gw, egress)) = Self::parse_default_route(&out) {
                self.saved_gateway = Some(gw);
                self.saved_interface = Some(egress);
            }
        }

        // Pin the server endpoint through the original gateway so the
        // encrypted traffic itself does not enter the tunnel.
        if let (Some(gw), Some(egress)) = (&self.saved_gateway, &self.saved_interface) {
            let host = endpoint_host(server_endpoint);
            if validate::ip(host).is_ok() {
                let host_route = format!("{host}/32");
                if let Err(e) = run("ip", &["route", "add", &host_route, "via", gw, "dev", egress])
                {
                    warn!(error = %e, "failed to pin server endpoint route");
                }
            }
        }

        let _ = run("ip", &["route", "del", "default"]);
        run("ip", &["route", "add", "default", "dev", iface])
    }

    fn remove_default_route(&mut self, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        let _ = run("ip", &["route", "del", "default", "dev", iface]);

        match (self.saved_gateway.take(), self.saved_interface.take()) {
            (Some(gw), Some(egress)) => {
                run("ip", &["route", "add", "default", "via", &gw, "dev", &egress])
            }
            _ => Ok(()),
        }
    }

    fn enable_ip_forwarding(&mut self) -> Result<()> {
        run("sysctl", &["-w", "net.ipv4.ip_forward=1"])
    }

    fn configure_nat(&mut self, _iface: &str, vpn_subnet: &str) -> Result<()> {
        validate::cidr(vpn_subnet)?;
        let out_iface = Self::default_outbound_interface();
        run(
            "iptables",
            &[
                "-t", "nat", "-A", "POSTROUTING", "-s", vpn_subnet, "-o", &out_iface, "-j",
                "MASQUERADE",
            ],
        )
    }

    fn remove_nat(&mut self, _iface: &str, vpn_subnet: &str) -> Result<()> {
        validate::cidr(vpn_subnet)?;
        let out_iface = Self::default_outbound_interface();
        run(
            "iptables",
            &[
                "-t", "nat", "-D", "POSTROUTING", "-s", vpn_subnet, "-o", &out_iface, "-j",
                "MASQUERADE",
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_default_route() {
        let out = "default via 192.168.1.1 dev eth0 proto dhcp src 192.168.1.50 metric 100\n";
        let (gw, iface) = LinuxConfigurator::parse_default_route(out).expect("parse");
        assert_eq!(gw, "192.168.1.1");
        assert_eq!(iface, "eth0");
    }

    #[test]
    fn takes_only_the_first_of_multiple_default_routes() {
        let out = "default via 10.0.0.1 dev wlan0 metric 600\n\
                   default via 192.168.1.1 dev eth0 metric 100\n";
        let (gw, iface) = LinuxConfigurator::parse_default_route(out).expect("parse");
        assert_eq!(gw, "10.0.0.1");
        assert_eq!(iface, "wlan0");
    }

    #[test]
    fn rejects_unexpected_route_output() {
        assert!(LinuxConfigurator::parse_default_route("").is_none());
        assert!(LinuxConfigurator::parse_default_route("default dev tun0 scope link\n").is_none());
        assert!(LinuxConfigurator::parse_default_route("192.168.1.0/24 dev eth0\n").is_none());
    }

    #[test]
    fn hostile_inputs_never_reach_commands() {
        let mut configurator = LinuxConfigurator::new();
        assert!(configurator
            .assign_address("wg0; reboot", "10.0.0.1/24")
            .is_err());
        assert!(configurator
            .assign_address("wg0", "10.0.0.1/24 && true")
            .is_err());
        assert!(configurator
            .add_route("10.0.0.0/24", Some("$(id)"), "wg0")
            .is_err());
        assert!(configurator.configure_nat("wg0", "not-a-subnet").is_err());
    }
}
