// src/device/simulated.rs
//! Software simulator backend

use super::connection::ConnectionKind;
use super::DeviceInfo;
use crate::geo::Coordinate;
use std::fmt;
use std::sync::Arc;

/// Location control surface of a running software simulator.
pub trait SimulatorBridge: Send + Sync {
    fn set_location(&self, latitude: f64, longitude: f64) -> bool;

    /// Drop the simulated location. Simulators without a real GPS accept this
    /// as a no-op.
    fn clear_location(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    bridge: Arc<dyn SimulatorBridge>,
}

impl SimulatedDevice {
    pub fn new(info: DeviceInfo, bridge: Arc<dyn SimulatorBridge>) -> Self {
        Self { info, bridge }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn connection_kind(&self) -> ConnectionKind {
        ConnectionKind::UNKNOWN
    }

    pub fn simulate_location(&self, coordinate: Coordinate) -> bool {
        self.bridge
            .set_location(coordinate.latitude, coordinate.longitude)
    }

    pub fn disable_simulation(&self) -> bool {
        self.bridge.clear_location()
    }
}

impl fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .finish()
    }
}
