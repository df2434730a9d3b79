// src/discovery/source.rs
//! Raw device event sources, one per backend

use crate::device::{
    BackendKind, ConnectionKind, Device, DeviceId, DeviceInfo, MobileDeviceService,
    PhysicalDevice, SimulatedDevice, SimulatorBridge, SupportImageStore,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Added,
    Removed,
    Paired,
}

/// Event as reported by a backend's device notification feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeviceEvent {
    pub kind: RawEventKind,
    pub id: DeviceId,
    pub connection: ConnectionKind,
    /// Display name, when the backend reports it together with the event.
    pub name: Option<String>,
}

impl RawDeviceEvent {
    pub fn new(kind: RawEventKind, id: impl Into<DeviceId>, connection: ConnectionKind) -> Self {
        Self {
            kind,
            id: id.into(),
            connection,
            name: None,
        }
    }

    pub fn added(id: impl Into<DeviceId>, connection: ConnectionKind) -> Self {
        Self::new(RawEventKind::Added, id, connection)
    }

    pub fn removed(id: impl Into<DeviceId>, connection: ConnectionKind) -> Self {
        Self::new(RawEventKind::Removed, id, connection)
    }

    pub fn paired(id: impl Into<DeviceId>, connection: ConnectionKind) -> Self {
        Self::new(RawEventKind::Paired, id, connection)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Backend specific side of discovery.
pub trait DeviceEventSource: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Start receiving raw events. `None` if the backend refused the
    /// subscription or is already subscribed.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<RawDeviceEvent>>;

    /// Stop delivering events. Returns false if there was no subscription.
    fn unsubscribe(&self) -> bool;

    /// Look up the display name of a newly seen device. May block.
    fn device_name(&self, id: &DeviceId, connection: ConnectionKind) -> Option<String>;

    /// Build the device handle stored in the registry.
    fn make_device(&self, info: DeviceInfo, connection: watch::Receiver<ConnectionKind>) -> Device;
}

/// Subscription slot that backend callbacks publish raw events into.
///
/// The backend (or a test) keeps an `Arc<EventFeed>` and calls
/// [`EventFeed::publish`] from whatever thread it is notified on; events are
/// dropped while nobody is subscribed.
#[derive(Debug, Default)]
pub struct EventFeed {
    sender: Mutex<Option<mpsc::UnboundedSender<RawDeviceEvent>>>,
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<RawDeviceEvent>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<RawDeviceEvent>> {
        let mut slot = self.slot();
        if slot.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(tx);
        Some(rx)
    }

    pub fn unsubscribe(&self) -> bool {
        self.slot().take().is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot().is_some()
    }

    /// Forward `event` to the subscriber. Returns false if it was dropped.
    pub fn publish(&self, event: RawDeviceEvent) -> bool {
        match self.slot().as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }
}

/// Event source for physical devices reached through a protocol bridge.
pub struct PhysicalEventSource {
    feed: Arc<EventFeed>,
    service: Arc<dyn MobileDeviceService>,
    images: Arc<dyn SupportImageStore>,
    prefer_network: bool,
}

impl PhysicalEventSource {
    pub fn new(
        feed: Arc<EventFeed>,
        service: Arc<dyn MobileDeviceService>,
        images: Arc<dyn SupportImageStore>,
    ) -> Self {
        Self {
            feed,
            service,
            images,
            prefer_network: false,
        }
    }

    /// Initial network preference of every device created by this source.
    pub fn with_prefer_network(mut self, prefer_network: bool) -> Self {
        self.prefer_network = prefer_network;
        self
    }
}

impl DeviceEventSource for PhysicalEventSource {
    fn backend(&self) -> BackendKind {
        BackendKind::Physical
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<RawDeviceEvent>> {
        self.feed.subscribe()
    }

    fn unsubscribe(&self) -> bool {
        self.feed.unsubscribe()
    }

    fn device_name(&self, id: &DeviceId, connection: ConnectionKind) -> Option<String> {
        self.service.device_name(id.as_str(), connection.lookup_mode())
    }

    fn make_device(&self, info: DeviceInfo, connection: watch::Receiver<ConnectionKind>) -> Device {
        PhysicalDevice::new(
            info,
            connection,
            Arc::clone(&self.service),
            Arc::clone(&self.images),
        )
        .with_prefer_network(self.prefer_network)
        .into()
    }
}

type BridgeFactory = dyn Fn(&DeviceId) -> Arc<dyn SimulatorBridge> + Send + Sync;

/// Event source for software simulators. Simulator feeds report the device
/// name together with the event.
pub struct SimulatorEventSource {
    feed: Arc<EventFeed>,
    bridges: Box<BridgeFactory>,
}

impl SimulatorEventSource {
    pub fn new<F>(feed: Arc<EventFeed>, bridges: F) -> Self
    where
        F: Fn(&DeviceId) -> Arc<dyn SimulatorBridge> + Send + Sync + 'static,
    {
        Self {
            feed,
            bridges: Box::new(bridges),
        }
    }
}

impl DeviceEventSource for SimulatorEventSource {
    fn backend(&self) -> BackendKind {
        BackendKind::Simulated
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<RawDeviceEvent>> {
        self.feed.subscribe()
    }

    fn unsubscribe(&self) -> bool {
        self.feed.unsubscribe()
    }

    fn device_name(&self, _id: &DeviceId, _connection: ConnectionKind) -> Option<String> {
        None
    }

    fn make_device(&self, info: DeviceInfo, _connection: watch::Receiver<ConnectionKind>) -> Device {
        let bridge = (self.bridges)(&info.id);
        SimulatedDevice::new(info, bridge).into()
    }
}
