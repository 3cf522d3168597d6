//! Tunnel adapter: one WireGuard device with an enforced lifecycle.
//!
//! A [`Tunnel`] owns a single [`WireGuardDevice`] and serializes all
//! configuration pushes through one mutex. The lifecycle is
//! new → configured → up → closed; once closed, every mutating operation
//! fails and further `close` calls are no-ops.

use parking_lot::Mutex;
use tracing::debug;

use crate::device::WireGuardDevice;
use crate::error::{Result, WireGuardError};

#[cfg(all(feature = "device", unix))]
use crate::device::LogLevel;

/// A WireGuard device plus TUN interface with lifecycle enforcement.
pub struct Tunnel {
    device: Box<dyn WireGuardDevice>,
    // Guards the closed flag and serializes UAPI pushes, so concurrent
    // peer installs are applied one at a time.
    closed: Mutex<bool>,
}

impl Tunnel {
    /// Wraps an existing device in a tunnel.
    #[must_use]
    pub fn new(device: Box<dyn WireGuardDevice>) -> Self {
        Self {
            device,
            closed: Mutex::new(false),
        }
    }

    /// Creates a TUN interface with the requested name and a boringtun
    /// device on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TUN interface or the device cannot be
    /// created (typically: missing privileges or a name collision).
    #[cfg(all(feature = "device", unix))]
    pub fn create(name: &str, mtu: u16, log_level: LogLevel) -> Result<Self> {
        let device = crate::userspace::BoringtunDevice::create(name, mtu, log_level)?;
        Ok(Self::new(Box::new(device)))
    }

    /// Applies a UAPI configuration string to the device.
    ///
    /// # Errors
    ///
    /// Returns [`WireGuardError::TunnelClosed`] after `close`, or the
    /// device's error if it rejects the configuration.
    pub fn configure(&self, uapi_config: &str) -> Result<()> {
        let closed = self.closed.lock();
        if *closed {
            return Err(WireGuardError::TunnelClosed);
        }
        self.device.apply_uapi(uapi_config)
    }

    /// Brings the device up.
    ///
    /// # Errors
    ///
    /// Returns [`WireGuardError::TunnelClosed`] after `close`.
    pub fn up(&self) -> Result<()> {
        let closed = self.closed.lock();
        if *closed {
            return Err(WireGuardError::TunnelClosed);
        }
        self.device.up()
    }

    /// Brings the device down without releasing it.
    ///
    /// # Errors
    ///
    /// Returns [`WireGuardError::TunnelClosed`] after `close`.
    pub fn down(&self) -> Result<()> {
        let closed = self.closed.lock();
        if *closed {
            return Err(WireGuardError::TunnelClosed);
        }
        self.device.down()
    }

    /// Shuts down the device and its TUN interface. Idempotent: calls after
    /// the first are no-ops.
    pub fn close(&self) {
        let mut closed = self.closed.lock();
        if *closed {
            return;
        }
        *closed = true;
        debug!(iface = %self.device.name(), "closing tunnel");
        self.device.close();
    }

    /// The OS-assigned interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.device.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FakeDevice;
    use std::sync::Arc;

    #[test]
    fn configure_pushes_to_device() {
        let tunnel = Tunnel::new(Box::new(FakeDevice::new("wgtest0")));
        tunnel.configure("private_key=ab\n").expect("configure");
        assert_eq!(tunnel.name(), "wgtest0");
    }

    #[test]
    fn operations_fail_after_close() {
        let tunnel = Tunnel::new(Box::new(FakeDevice::new("wgtest0")));
        tunnel.close();
        assert!(matches!(
            tunnel.configure("x\n"),
            Err(WireGuardError::TunnelClosed)
        ));
        assert!(matches!(tunnel.up(), Err(WireGuardError::TunnelClosed)));
        assert!(matches!(tunnel.down(), Err(WireGuardError::TunnelClosed)));
    }

    #[test]
    fn close_is_idempotent() {
        let tunnel = Tunnel::new(Box::new(FakeDevice::new("wgtest0")));
        tunnel.close();
        tunnel.close();
        tunnel.close();
    }

    #[test]
    fn up_then_down() {
        let tunnel = Tunnel::new(Box::new(FakeDevice::new("wgtest0")));
        tunnel.up().expect("up");
        tunnel.down().expect("down");
    }

    #[test]
    fn concurrent_configures_all_land() {
        let tunnel = Arc::new(Tunnel::new(Box::new(FakeDevice::new("wgtest0"))));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tunnel = Arc::clone(&tunnel);
                std::thread::spawn(move || tunnel.configure(&format!("push{i}\n")))
            })
            .collect();
        for handle in handles {
            handle.join().expect("join").expect("configure");
        }
    }

    #[test]
    fn device_error_propagates() {
        let tunnel = Tunnel::new(Box::new(FakeDevice::failing("wgtest0")));
        assert!(matches!(
            tunnel.configure("x\n"),
            Err(WireGuardError::Device(_))
        ));
    }
}
