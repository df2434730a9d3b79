// src/discovery/mod.rs
//! Device discovery
//!
//! A [`DeviceDiscovery`] owns the registry of one backend. Raw events arrive
//! on a background thread, are translated by [`DeviceRegistry::apply`] and go
//! out to any number of subscribers on a broadcast channel.

pub mod registry;
pub mod source;

pub use registry::{DeviceEvent, DeviceRegistry, DeviceSnapshot};
pub use source::{
    DeviceEventSource, EventFeed, PhysicalEventSource, RawDeviceEvent, RawEventKind,
    SimulatorEventSource,
};

use crate::device::{BackendKind, DeviceId};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 64;

pub struct DeviceDiscovery {
    source: Arc<dyn DeviceEventSource>,
    registry: Arc<RwLock<DeviceRegistry>>,
    events: broadcast::Sender<DeviceEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn read(registry: &RwLock<DeviceRegistry>) -> RwLockReadGuard<'_, DeviceRegistry> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(registry: &RwLock<DeviceRegistry>) -> RwLockWriteGuard<'_, DeviceRegistry> {
    registry.write().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceDiscovery {
    pub fn new(source: Arc<dyn DeviceEventSource>, detect_network_devices: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            registry: Arc::new(RwLock::new(DeviceRegistry::new(detect_network_devices))),
            events,
            worker: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.source.backend()
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start listening for device events. Returns false if discovery is
    /// already running or the backend refused the subscription.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return false;
        }

        let Some(mut feed) = self.source.subscribe() else {
            warn!(backend = %self.backend(), "Device event subscription failed");
            return false;
        };

        write(&self.registry).set_active(true);

        let source = Arc::clone(&self.source);
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();

        let handle = std::thread::Builder::new()
            .name(format!("{}-discovery", self.backend()))
            .spawn(move || {
                while let Some(raw) = feed.blocking_recv() {
                    let mut registry = write(&registry);
                    if let Some(event) = registry.apply(raw, source.as_ref()) {
                        debug!(event = event.label(), device = %event.device(), "Device event");
                        // Sent under the lock so stop() cannot overtake it.
                        let _ = events.send(event);
                    }
                }
            });

        match handle {
            Ok(handle) => {
                *worker = Some(handle);
                debug!(backend = %self.backend(), "Device discovery started");
                true
            }
            Err(e) => {
                warn!(backend = %self.backend(), error = %e, "Could not start discovery thread");
                self.source.unsubscribe();
                false
            }
        }
    }

    /// Stop listening. Every registered device is reported as disconnected and
    /// the registry is cleared. Returns false if discovery was not running.
    pub fn stop(&self) -> bool {
        let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };

        {
            let mut registry = write(&self.registry);
            registry.set_active(false);
            for event in registry.drain() {
                let _ = self.events.send(event);
            }
        }

        self.source.unsubscribe();
        if handle.join().is_err() {
            warn!(backend = %self.backend(), "Discovery thread panicked");
        }
        debug!(backend = %self.backend(), "Device discovery stopped");
        true
    }

    /// Registered devices, sorted by name.
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        read(&self.registry).snapshots()
    }

    /// The device with `id`, if it is still registered.
    pub fn device(&self, id: &DeviceId) -> Option<DeviceSnapshot> {
        read(&self.registry).get(id)
    }
}

impl Drop for DeviceDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ConnectionKind, SimulatorBridge};
    use tokio::sync::broadcast::error::TryRecvError;

    struct NullBridge;

    impl SimulatorBridge for NullBridge {
        fn set_location(&self, _latitude: f64, _longitude: f64) -> bool {
            true
        }
    }

    fn simulator_discovery(detect_network_devices: bool) -> (Arc<EventFeed>, DeviceDiscovery) {
        let feed = Arc::new(EventFeed::new());
        let source = SimulatorEventSource::new(Arc::clone(&feed), |_id| {
            Arc::new(NullBridge) as Arc<dyn SimulatorBridge>
        });
        (feed, DeviceDiscovery::new(Arc::new(source), detect_network_devices))
    }

    #[test]
    fn test_usb_then_network_is_one_device() {
        let (feed, discovery) = simulator_discovery(true);
        let mut events = discovery.subscribe();
        assert!(discovery.start());
        assert!(!discovery.start());

        feed.publish(RawDeviceEvent::added("X", ConnectionKind::USB).with_name("Phone"));
        feed.publish(RawDeviceEvent::added("X", ConnectionKind::NETWORK));

        let first = events.blocking_recv().unwrap();
        let second = events.blocking_recv().unwrap();
        assert!(matches!(first, DeviceEvent::Connected(_)));
        assert!(matches!(second, DeviceEvent::Changed(_)));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        let devices = discovery.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices[0].connection,
            ConnectionKind::USB | ConnectionKind::NETWORK
        );
        assert_eq!(devices[0].device.connection_kind(), ConnectionKind::UNKNOWN);
    }

    #[test]
    fn test_stop_disconnects_registered_devices() {
        let (feed, discovery) = simulator_discovery(true);
        let mut events = discovery.subscribe();
        assert!(!discovery.stop());
        assert!(discovery.start());

        feed.publish(RawDeviceEvent::added("A", ConnectionKind::UNKNOWN).with_name("Sim A"));
        events.blocking_recv().unwrap();

        assert!(discovery.stop());
        assert!(!discovery.is_running());
        assert!(!feed.is_subscribed());

        let event = events.blocking_recv().unwrap();
        assert!(matches!(event, DeviceEvent::Disconnected(_)));
        assert_eq!(event.device().id(), &DeviceId::from("A"));
        assert!(discovery.devices().is_empty());
        assert!(discovery.device(&DeviceId::from("A")).is_none());

        // events after stop are dropped at the feed
        assert!(!feed.publish(RawDeviceEvent::added("B", ConnectionKind::UNKNOWN)));
    }

    #[test]
    fn test_restart_after_stop() {
        let (feed, discovery) = simulator_discovery(true);
        assert!(discovery.start());
        assert!(discovery.stop());
        assert!(discovery.start());

        let mut events = discovery.subscribe();
        feed.publish(RawDeviceEvent::added("A", ConnectionKind::UNKNOWN).with_name("Sim A"));
        assert!(matches!(
            events.blocking_recv().unwrap(),
            DeviceEvent::Connected(_)
        ));
        assert!(discovery.device(&DeviceId::from("A")).is_some());
    }

    #[test]
    fn test_network_devices_ignored_when_disabled() {
        let (feed, discovery) = simulator_discovery(false);
        let mut events = discovery.subscribe();
        assert!(discovery.start());

        feed.publish(RawDeviceEvent::added("N", ConnectionKind::NETWORK).with_name("Wifi"));
        feed.publish(RawDeviceEvent::added("U", ConnectionKind::USB).with_name("Cable"));

        let event = events.blocking_recv().unwrap();
        assert_eq!(event.device().name(), "Cable");
        assert_eq!(discovery.devices().len(), 1);
    }
}
