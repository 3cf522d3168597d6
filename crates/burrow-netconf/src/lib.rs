//! Platform-specific host network configuration.
//!
//! The VPN needs the same capability set everywhere: assign an address,
//! bring a link up, take over the default route (and give it back), enable
//! forwarding, masquerade a subnet. The tooling differs per platform:
//! `ip`/`iptables` on Linux, `ifconfig`/`route` on macOS, `netsh`/`route`/
//! PowerShell on Windows. [`InterfaceConfigurator`] is that capability set;
//! [`host_configurator`] resolves the variant for the build target.
//!
//! Default-route takeover snapshots the current default gateway and egress
//! interface on the configurator instance; `remove_default_route` consumes
//! the snapshot to restore the original route. Each `set_default_route`
//! overwrites the previous snapshot.

pub mod command;
pub mod error;
pub mod mask;
pub mod validate;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::LinuxConfigurator;
#[cfg(target_os = "macos")]
pub use macos::MacosConfigurator;
#[cfg(target_os = "windows")]
pub use windows::WindowsConfigurator;

pub use error::{NetconfError, Result};

/// The capability set for host network reconfiguration.
///
/// All operations validate their inputs before shelling out. Operations
/// that fail return errors carrying the full command line and its combined
/// output.
pub trait InterfaceConfigurator: Send {
    /// Assigns an IPv4 address with prefix length to the interface.
    fn assign_address(&mut self, iface: &str, cidr: &str) -> Result<()>;

    /// Brings the link administratively up.
    fn set_interface_up(&mut self, iface: &str) -> Result<()>;

    /// Applies the MTU to the interface.
    fn set_mtu(&mut self, iface: &str, mtu: u16) -> Result<()>;

    /// Installs a route to `destination` (CIDR). With a gateway the route
    /// goes via it; without, the route is interface-scoped.
    fn add_route(&mut self, destination: &str, gateway: Option<&str>, iface: &str) -> Result<()>;

    /// Takes over the default route: snapshots the current default gateway
    /// and egress interface, pins a host route for the server endpoint via
    /// the original gateway (so tunnel traffic cannot loop through itself),
    /// then replaces the default route with one through `iface`.
    fn set_default_route(&mut self, iface: &str, gateway: &str, server_endpoint: &str)
        -> Result<()>;

    /// Removes the VPN default route and, if a snapshot exists, restores
    /// the original default route.
    fn remove_default_route(&mut self, iface: &str) -> Result<()>;

    /// Enables IPv4 forwarding system-wide (server side).
    fn enable_ip_forwarding(&mut self) -> Result<()>;

    /// Source-NATs the VPN subnet out of the default outbound interface
    /// (server side).
    fn configure_nat(&mut self, iface: &str, vpn_subnet: &str) -> Result<()>;

    /// Reverses [`InterfaceConfigurator::configure_nat`].
    fn remove_nat(&mut self, iface: &str, vpn_subnet: &str) -> Result<()>;
}

/// Returns the configurator variant for the platform this binary was built
/// for.
#[must_use]
pub fn host_configurator() -> Box<dyn InterfaceConfigurator> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxConfigurator::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(MacosConfigurator::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(WindowsConfigurator::new())
    }
}

/// Extracts the host part of a `host:port` endpoint.
pub(crate) fn endpoint_host(endpoint: &str) -> &str {
    endpoint.split(':').next().unwrap_or(endpoint)
}
