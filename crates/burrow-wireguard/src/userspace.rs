//! Production device binding over boringtun's userspace engine.
//!
//! boringtun's device mode creates the TUN interface itself, runs the
//! packet-processing threads, and listens for UAPI configuration on a unix
//! socket at `/var/run/wireguard/<name>.sock` (the same channel `wg(8)`
//! uses). This binding talks to that socket with `set=1` transactions.
//!
//! The engine starts processing as soon as the device exists, and the
//! interface MTU and link state are host-network concerns handled by the
//! interface configurator, so `up`/`down` here only mark intent.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use boringtun::device::{DeviceConfig, DeviceHandle};
use parking_lot::Mutex;
use tracing::debug;

use crate::device::{LogLevel, WireGuardDevice};
use crate::error::{Result, WireGuardError};

const SOCK_DIR: &str = "/var/run/wireguard";

/// A boringtun device-mode instance bound to one TUN interface.
pub struct BoringtunDevice {
    name: String,
    handle: Mutex<Option<DeviceHandle>>,
}

impl BoringtunDevice {
    /// Creates the TUN interface and starts the boringtun engine on it.
    ///
    /// The requested MTU is recorded for logging only; the interface
    /// configurator applies it to the link. On macOS the kernel may assign a
    /// different `utun` name than requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the TUN interface or the engine cannot be
    /// created.
    pub fn create(name: &str, mtu: u16, log_level: LogLevel) -> Result<Self> {
        debug!(iface = %name, mtu, level = %log_level, "starting userspace WireGuard device");

        let handle = DeviceHandle::new(name, DeviceConfig::default())
            .map_err(|e| WireGuardError::Device(format!("create device {name:?}: {e:?}")))?;

        Ok(Self {
            name: name.to_string(),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn socket_path(&self) -> PathBuf {
        PathBuf::from(SOCK_DIR).join(format!("{}.sock", self.name))
    }

    /// Runs one UAPI `set=1` transaction against the device socket and
    /// checks the returned errno.
    fn uapi_set(&self, config: &str) -> Result<()> {
        let path = self.socket_path();
        let mut stream = UnixStream::connect(&path).map_err(|e| {
            WireGuardError::Device(format!("connect {}: {e}", path.display()))
        })?;

        stream
            .write_all(format!("set=1\n{config}\n").as_bytes())
            .map_err(|e| WireGuardError::Device(format!("write uapi: {e}")))?;

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(|e| WireGuardError::Device(format!("read uapi response: {e}")))?;

        for line in response.lines() {
            if let Some(errno) = line.strip_prefix("errno=") {
                if errno == "0" {
                    return Ok(());
                }
                return Err(WireGuardError::Device(format!(
                    "device rejected configuration (errno={errno})"
                )));
            }
        }

        Err(WireGuardError::Device(
            "no errno in uapi response".to_string(),
        ))
    }
}

impl WireGuardDevice for BoringtunDevice {
    fn apply_uapi(&self, config: &str) -> Result<()> {
        if self.handle.lock().is_none() {
            return Err(WireGuardError::TunnelClosed);
        }
        self.uapi_set(config)
    }

    fn up(&self) -> Result<()> {
        if self.handle.lock().is_none() {
            return Err(WireGuardError::TunnelClosed);
        }
        debug!(iface = %self.name, "device up");
        Ok(())
    }

    fn down(&self) -> Result<()> {
        if self.handle.lock().is_none() {
            return Err(WireGuardError::TunnelClosed);
        }
        debug!(iface = %self.name, "device down");
        Ok(())
    }

    fn close(&self) {
        // Dropping the handle triggers engine exit and removes the socket.
        if self.handle.lock().take().is_some() {
            debug!(iface = %self.name, "userspace device stopped");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
