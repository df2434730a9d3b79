// src/device/mod.rs
//! Devices whose GPS position can be simulated
//!
//! Only two backends exist, so [`Device`] is a closed enum rather than a trait
//! object. Devices compare equal by id alone: a phone that gains a USB
//! connection next to its network connection is still the same device.

pub mod connection;
pub mod physical;
pub mod simulated;
pub mod support;

pub use connection::{ConnectionKind, LookupMode};
pub use physical::{MobileDeviceService, PhysicalDevice};
pub use simulated::{SimulatedDevice, SimulatorBridge};
pub use support::{DirectoryImageStore, SupportImage, SupportImageStore};

use crate::error::DeviceError;
use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Opaque unique device id (UDID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Which backend a device or a discovery source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Physical,
    Simulated,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Physical => write!(f, "physical"),
            BackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// A connection kind that never changes, for devices created outside of
/// discovery.
pub fn fixed_connection(kind: ConnectionKind) -> watch::Receiver<ConnectionKind> {
    let (_tx, rx) = watch::channel(kind);
    rx
}

#[derive(Debug, Clone)]
pub enum Device {
    Physical(PhysicalDevice),
    Simulated(SimulatedDevice),
}

impl Device {
    pub fn info(&self) -> &DeviceInfo {
        match self {
            Device::Physical(device) => device.info(),
            Device::Simulated(device) => device.info(),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.info().id
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    /// The current connection kind, always the latest value known to discovery.
    pub fn connection_kind(&self) -> ConnectionKind {
        match self {
            Device::Physical(device) => device.connection_kind(),
            Device::Simulated(device) => device.connection_kind(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Device::Physical(_) => BackendKind::Physical,
            Device::Simulated(_) => BackendKind::Simulated,
        }
    }

    /// Pair the device. Blocks; simulators always succeed.
    pub fn pair(&self) -> Result<(), DeviceError> {
        match self {
            Device::Physical(device) => device.pair(),
            Device::Simulated(_) => Ok(()),
        }
    }

    /// Send `coordinate` to the device. Blocks until the device answered.
    pub fn simulate_location(&self, coordinate: Coordinate) -> bool {
        match self {
            Device::Physical(device) => device.simulate_location(coordinate),
            Device::Simulated(device) => device.simulate_location(coordinate),
        }
    }

    /// Return the device to its real position. Blocks until the device answered.
    pub fn disable_simulation(&self) -> bool {
        match self {
            Device::Physical(device) => device.disable_simulation(),
            Device::Simulated(device) => device.disable_simulation(),
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Device {}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(id: {}, name: {}, connection: {})",
            self.backend(),
            self.id(),
            self.name(),
            self.connection_kind()
        )
    }
}

impl From<PhysicalDevice> for Device {
    fn from(device: PhysicalDevice) -> Self {
        Device::Physical(device)
    }
}

impl From<SimulatedDevice> for Device {
    fn from(device: SimulatedDevice) -> Self {
        Device::Simulated(device)
    }
}
