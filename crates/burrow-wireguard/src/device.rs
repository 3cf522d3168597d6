//! The device seam between the control plane and the WireGuard engine.
//!
//! The control plane never speaks to the cryptographic engine directly; it
//! pushes UAPI text through [`WireGuardDevice`]. The production binding
//! ([`crate::BoringtunDevice`], behind the `device` feature) runs boringtun
//! in device mode over a TUN interface. [`FakeDevice`] records every push
//! and is what the orchestrator and API tests run against.

use std::str::FromStr;

use parking_lot::Mutex;

use crate::error::{Result, WireGuardError};

/// Verbosity of the WireGuard engine's own logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Log everything the engine does.
    Verbose,
    /// Log errors only.
    #[default]
    Error,
    /// No engine logging.
    Silent,
}

impl FromStr for LogLevel {
    type Err = WireGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "verbose" => Ok(Self::Verbose),
            "error" => Ok(Self::Error),
            "silent" => Ok(Self::Silent),
            other => Err(WireGuardError::InvalidLogLevel(other.to_string())),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verbose => write!(f, "verbose"),
            Self::Error => write!(f, "error"),
            Self::Silent => write!(f, "silent"),
        }
    }
}

/// A userspace WireGuard device over a TUN interface.
///
/// Implementations own both halves: the TUN device and the engine processing
/// packets on it. Configuration happens exclusively through UAPI text.
pub trait WireGuardDevice: Send + Sync {
    /// Applies a UAPI configuration fragment to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the configuration.
    fn apply_uapi(&self, config: &str) -> Result<()>;

    /// Starts packet processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be brought up.
    fn up(&self) -> Result<()>;

    /// Stops packet processing without releasing the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be brought down.
    fn down(&self) -> Result<()>;

    /// Releases the device and its TUN interface.
    fn close(&self);

    /// The OS-assigned interface name. May differ from the requested name on
    /// platforms that auto-suffix (e.g. `utun` on macOS).
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct FakeDeviceState {
    uapi_pushes: Vec<String>,
    up: bool,
    closed: bool,
}

/// An in-memory device that records every operation.
///
/// Used wherever a test needs the control plane without a real TUN
/// interface: it accepts any UAPI text and remembers the order of pushes.
pub struct FakeDevice {
    name: String,
    state: Mutex<FakeDeviceState>,
    fail_uapi: bool,
}

impl FakeDevice {
    /// Creates a fake device with the given interface name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FakeDeviceState::default()),
            fail_uapi: false,
        }
    }

    /// Creates a fake device whose `apply_uapi` always fails. Used to
    /// exercise compensation paths.
    #[must_use]
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FakeDeviceState::default()),
            fail_uapi: true,
        }
    }

    /// Returns all UAPI fragments applied so far, in order.
    #[must_use]
    pub fn uapi_pushes(&self) -> Vec<String> {
        self.state.lock().uapi_pushes.clone()
    }

    /// Whether the device is currently up.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.state.lock().up
    }

    /// Whether the device has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl WireGuardDevice for FakeDevice {
    fn apply_uapi(&self, config: &str) -> Result<()> {
        if self.fail_uapi {
            return Err(WireGuardError::Device("injected failure".to_string()));
        }
        self.state.lock().uapi_pushes.push(config.to_string());
        Ok(())
    }

    fn up(&self) -> Result<()> {
        self.state.lock().up = true;
        Ok(())
    }

    fn down(&self) -> Result<()> {
        self.state.lock().up = false;
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.up = false;
        state.closed = true;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_known_names() {
        assert_eq!("verbose".parse::<LogLevel>().unwrap(), LogLevel::Verbose);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("silent".parse::<LogLevel>().unwrap(), LogLevel::Silent);
    }

    #[test]
    fn log_level_rejects_unknown_names() {
        let err = "debug".parse::<LogLevel>().unwrap_err();
        assert!(matches!(err, WireGuardError::InvalidLogLevel(_)));
    }

    #[test]
    fn fake_device_records_pushes_in_order() {
        let device = FakeDevice::new("wgtest0");
        device.apply_uapi("first\n").expect("push");
        device.apply_uapi("second\n").expect("push");
        assert_eq!(device.uapi_pushes(), vec!["first\n", "second\n"]);
    }

    #[test]
    fn fake_device_tracks_up_state() {
        let device = FakeDevice::new("wgtest0");
        assert!(!device.is_up());
        device.up().expect("up");
        assert!(device.is_up());
        device.down().expect("down");
        assert!(!device.is_up());
    }

    #[test]
    fn failing_device_rejects_uapi() {
        let device = FakeDevice::failing("wgtest0");
        assert!(device.apply_uapi("x\n").is_err());
        assert!(device.uapi_pushes().is_empty());
    }
}
