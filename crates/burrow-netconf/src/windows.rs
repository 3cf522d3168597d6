//! Windows configurator: `netsh`, `route`, and PowerShell `New-NetNat`.
//!
//! Windows `route` commands take a numeric interface index, not a name, so
//! route operations first resolve the index with `Get-NetAdapter`.

use tracing::warn;

use crate::command::{run, run_capture};
use crate::error::{NetconfError, Result};
use crate::mask::split_cidr;
use crate::{endpoint_host, validate, InterfaceConfigurator};

const NAT_RULE_NAME: &str = "BurrowVPN";

/// Host network configuration via netsh, route.exe, and PowerShell.
#[derive(Debug, Default)]
pub struct WindowsConfigurator {
    saved_gateway: Option<String>,
    saved_interface: Option<String>,
}

impl WindowsConfigurator {
    /// Creates a configurator with no saved route snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the numeric interface index route.exe requires.
    fn interface_index(iface: &str) -> Result<String> {
        validate::interface_name(iface)?;
        let script = format!("(Get-NetAdapter -Name '{iface}').ifIndex");
        let out = run_capture("powershell", &["-NoProfile", "-Command", &script])?;
        let index = out.trim();
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            return Err(NetconfError::CommandFailed {
                command: script,
                output: format!("unexpected interface index {index:?}"),
            });
        }
        Ok(index.to_string())
    }

    /// Picks the active default route out of `route print 0.0.0.0` output.
    fn parse_default_route(output: &str) -> Option<(String, String)> {
        for line in output.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 5 && fields[0] == "0.0.0.0" && fields[1] == "0.0.0.0" {
                return Some((fields[2].to_string(), fields[3].to_string()));
            }
        }
        None
    }
}

impl InterfaceConfigurator for WindowsConfigurator {
    fn assign_address(&mut self, iface: &str, cidr: &str) -> Result<()> {
        validate::interface_name(iface)?;
        let (addr, mask) = split_cidr(cidr)?;
        let name_arg = format!("name={iface}");
        run(
            "netsh",
            &[
                "interface",
                "ip",
                "set",
                "address",
                &name_arg,
                "static",
                &addr.to_string(),
                &mask.to_string(),
            ],
        )
    }

    fn set_interface_up(&mut self, iface: &str) -> Result<()> {
        // Interfaces come up automatically once configured through netsh.
        validate::interface_name(iface)?;
        Ok(())
    }

    fn set_mtu(&mut self, iface: &str, mtu: u16) -> Result<()> {
        validate::interface_name(iface)?;
        let mtu_arg = format!("mtu={mtu}");
        run(
            "netsh",
            &[
                "interface",
                "ipv4",
                "set",
                "subinterface",
                iface,
                &mtu_arg,
                "store=persistent",
            ],
        )
    }

    fn add_route(&mut self, destination: &str, gateway: Option<&str>, iface: &str) -> Result<()> {
        let (dest, mask) = split_cidr(destination)?;
        let dest = dest.to_string();
        let mask_str = mask.to_string();
        match gateway {
            Some(gw) => {
                validate::ip(gw)?;
                run("route", &["add", &dest, "mask", &mask_str, gw])
            }
            None => {
                let index = Self::interface_index(iface)?;
                run(
                    "route",
                    &["add", &dest, "mask", &mask_str, "0.0.0.0", "if", &index],
                )
            }
        }
    }

    fn set_default_route(
        &mut self,
        iface: &str,
        gateway: &str,
        server_endpoint: &str,
    ) -> Result<()> {
        validate::ip(gateway)?;

        if let Ok(out) = run_capture("route", &["print", "0.0.0.0"]) {
            if let Some((gw, egress)) = Self::parse_default_route(&out) {
                self.saved_gateway = Some(gw);
                self.saved_interface = Some(egress);
            }
        }

        if let Some(gw) = &self.saved_gateway {
            let host = endpoint_host(server_endpoint);
            if validate::ip(host).is_ok() {
                if let Err(e) = run(
                    "route",
                    &["add", host, "mask", "255.255.255.255", gw],
                ) {
                    warn!(error = %e, "failed to pin server endpoint route");
                }
            }
        }

        let index = Self::interface_index(iface)?;
        let _ = run("route", &["delete", "0.0.0.0", "mask", "0.0.0.0"]);
        run(
            "route",
            &["add", "0.0.0.0", "mask", "0.0.0.0", gateway, "if", &index],
        )
    }

    fn remove_default_route(&mut self, iface: &str) -> Result<()> {
        validate::interface_name(iface)?;
        let _ = run("route", &["delete", "0.0.0.0", "mask", "0.0.0.0"]);

        self.saved_interface.take();
        match self.saved_gateway.take() {
            Some(gw) => run("route", &["add", "0.0.0.0", "mask", "0.0.0.0", &gw]),
            None => Ok(()),
        }
    }

    fn enable_ip_forwarding(&mut self) -> Result<()> {
        run(
            "powershell",
            &[
                "-NoProfile",
                "-Command",
                "Set-NetIPInterface -Forwarding Enabled -AddressFamily IPv4",
            ],
        )
    }

    fn configure_nat(&mut self, _iface: &str, vpn_subnet: &str) -> Result<()> {
        validate::cidr(vpn_subnet)?;
        let script = format!(
            "New-NetNat -Name '{NAT_RULE_NAME}' -InternalIPInterfaceAddressPrefix '{vpn_subnet}'"
        );
        run("powershell", &["-NoProfile", "-Command", &script])
    }

    fn remove_nat(&mut self, _iface: &str, vpn_subnet: &str) -> Result<()> {
        validate::cidr(vpn_subnet)?;
        let script = format!("Remove-NetNat -Name '{NAT_RULE_NAME}' -Confirm:$false");
        run("powershell", &["-NoProfile", "-Command", &script])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_print_output() {
        let out = "IPv4 Route Table\n\
                   ===========================================================================\n\
                   Active Routes:\n\
                   Network Destination        Netmask          Gateway       Interface  Metric\n\
                             0.0.0.0          0.0.0.0      192.168.1.1    192.168.1.7     55\n";
        let (gw, iface) = WindowsConfigurator::parse_default_route(out).expect("parse");
        assert_eq!(gw, "192.168.1.1");
        assert_eq!(iface, "192.168.1.7");
    }

    #[test]
    fn no_default_route_in_output() {
        let out = "Active Routes:\n  10.0.0.0  255.0.0.0  On-link  10.0.0.7  281\n";
        assert!(WindowsConfigurator::parse_default_route(out).is_none());
    }

    #[test]
    fn hostile_interface_name_rejected_before_powershell() {
        assert!(WindowsConfigurator::interface_index("x'; Stop-Computer; '").is_err());
    }
}
