// src/device/physical.rs
//! Physical device backend
//!
//! The device protocol itself lives behind [`MobileDeviceService`]; this type
//! adds the pairing sequence, the support image mount and the lookup policy
//! on top of it.

use super::connection::{ConnectionKind, LookupMode};
use super::support::{major_minor, SupportImage, SupportImageStore};
use super::DeviceInfo;
use crate::error::DeviceError;
use crate::geo::Coordinate;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Point to point protocol bridge to a physical device.
///
/// All calls block until the device answered. Implementations must be safe
/// to call from a blocking worker thread.
pub trait MobileDeviceService: Send + Sync {
    /// Display name, e.g. "John's iPhone".
    fn device_name(&self, id: &str, lookup: LookupMode) -> Option<String>;

    /// Handshake with the device. Returns false if the device is not trusted.
    fn pair(&self, id: &str, lookup: LookupMode) -> bool;

    fn is_image_mounted(&self, id: &str, lookup: LookupMode) -> bool;

    /// OS version string, e.g. "16.4.1".
    fn product_version(&self, id: &str, lookup: LookupMode) -> Option<String>;

    /// OS name, e.g. "iPhone OS".
    fn product_name(&self, id: &str, lookup: LookupMode) -> Option<String>;

    fn mount_image(&self, id: &str, image: &SupportImage, lookup: LookupMode) -> bool;

    fn send_location(&self, id: &str, coordinate: Coordinate, lookup: LookupMode) -> bool;

    /// Return the device to its real GPS position.
    fn reset_location(&self, id: &str, lookup: LookupMode) -> bool;
}

#[derive(Clone)]
pub struct PhysicalDevice {
    info: DeviceInfo,
    connection: watch::Receiver<ConnectionKind>,
    prefer_network: bool,
    service: Arc<dyn MobileDeviceService>,
    images: Arc<dyn SupportImageStore>,
}

impl PhysicalDevice {
    pub fn new(
        info: DeviceInfo,
        connection: watch::Receiver<ConnectionKind>,
        service: Arc<dyn MobileDeviceService>,
        images: Arc<dyn SupportImageStore>,
    ) -> Self {
        Self {
            info,
            connection,
            prefer_network: false,
            service,
            images,
        }
    }

    /// Prefer the network connection even if the device is also plugged in.
    pub fn with_prefer_network(mut self, prefer_network: bool) -> Self {
        self.prefer_network = prefer_network;
        self
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn connection_kind(&self) -> ConnectionKind {
        *self.connection.borrow()
    }

    pub fn prefer_network(&self) -> bool {
        self.prefer_network
    }

    pub fn lookup_mode(&self) -> LookupMode {
        LookupMode::for_connection(self.connection_kind(), self.prefer_network)
    }

    /// True when commands travel over the network connection.
    pub fn uses_network(&self) -> bool {
        let kind = self.connection_kind();
        kind == ConnectionKind::NETWORK
            || (kind.contains(ConnectionKind::NETWORK) && self.prefer_network)
    }

    pub fn product_version(&self) -> Option<String> {
        self.service
            .product_version(self.info.id.as_str(), self.lookup_mode())
    }

    pub fn product_name(&self) -> Option<String> {
        self.service.product_name(self.info.id.as_str(), self.lookup_mode())
    }

    pub fn is_image_mounted(&self) -> bool {
        self.service
            .is_image_mounted(self.info.id.as_str(), self.lookup_mode())
    }

    /// Pair with the device and mount the support image if it is not mounted yet.
    pub fn pair(&self) -> Result<(), DeviceError> {
        let id = self.info.id.as_str();
        let lookup = self.lookup_mode();

        if !self.service.pair(id, lookup) {
            warn!(device = %self.info.id, "Pairing failed");
            return Err(DeviceError::Pairing("Could not pair device".to_string()));
        }

        if self.service.is_image_mounted(id, lookup) {
            debug!(device = %self.info.id, "Support image already mounted");
            return Ok(());
        }

        self.mount_support_image(id, lookup)
    }

    fn mount_support_image(&self, id: &str, lookup: LookupMode) -> Result<(), DeviceError> {
        let version = self
            .service
            .product_version(id, lookup)
            .and_then(|v| major_minor(&v));
        let os = self.service.product_name(id, lookup);

        let (os, version) = match (os, version) {
            (Some(os), Some(version)) => (os, version),
            _ => {
                return Err(DeviceError::ProductInfo(
                    "Could not read device information".to_string(),
                ))
            }
        };

        let image = self
            .images
            .resolve(&os, &version)
            .map_err(|e| DeviceError::Permission(format!("Support directory not accessible: {}", e)))?;

        if !self.images.is_present(&image) {
            debug!(device = %self.info.id, %os, %version, "Support image missing");
            return Err(DeviceError::SupportImageNotFound { os, version });
        }

        if !self.service.mount_image(id, &image, lookup) {
            warn!(device = %self.info.id, %os, %version, "Mounting support image failed");
            return Err(DeviceError::Mount { os, version });
        }

        debug!(device = %self.info.id, %os, %version, "Support image mounted");
        Ok(())
    }

    pub fn simulate_location(&self, coordinate: Coordinate) -> bool {
        self.service
            .send_location(self.info.id.as_str(), coordinate, self.lookup_mode())
    }

    pub fn disable_simulation(&self) -> bool {
        self.service
            .reset_location(self.info.id.as_str(), self.lookup_mode())
    }
}

impl fmt::Debug for PhysicalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalDevice")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .field("connection", &self.connection_kind())
            .field("prefer_network", &self.prefer_network)
            .finish()
    }
}
