// src/discovery/registry.rs
//! Per-backend device registry and raw event translation

use super::source::{DeviceEventSource, RawDeviceEvent, RawEventKind};
use crate::device::{ConnectionKind, Device, DeviceId, DeviceInfo};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, trace};

/// A device together with its connection kind at the moment it was captured.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub device: Device,
    pub connection: ConnectionKind,
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Connected(DeviceSnapshot),
    Paired(DeviceSnapshot),
    Changed(DeviceSnapshot),
    Disconnected(DeviceSnapshot),
}

impl DeviceEvent {
    pub fn snapshot(&self) -> &DeviceSnapshot {
        match self {
            DeviceEvent::Connected(snapshot)
            | DeviceEvent::Paired(snapshot)
            | DeviceEvent::Changed(snapshot)
            | DeviceEvent::Disconnected(snapshot) => snapshot,
        }
    }

    pub fn device(&self) -> &Device {
        &self.snapshot().device
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceEvent::Connected(_) => "connected",
            DeviceEvent::Paired(_) => "paired",
            DeviceEvent::Changed(_) => "changed",
            DeviceEvent::Disconnected(_) => "disconnected",
        }
    }
}

struct DeviceRecord {
    device: Device,
    connection: watch::Sender<ConnectionKind>,
}

impl DeviceRecord {
    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            device: self.device.clone(),
            connection: *self.connection.borrow(),
        }
    }
}

/// Known devices of one backend, keyed by id.
pub struct DeviceRegistry {
    records: HashMap<DeviceId, DeviceRecord>,
    detect_network_devices: bool,
    active: bool,
}

impl DeviceRegistry {
    pub fn new(detect_network_devices: bool) -> Self {
        Self {
            records: HashMap::new(),
            detect_network_devices,
            active: true,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Events applied while inactive are ignored.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn get(&self, id: &DeviceId) -> Option<DeviceSnapshot> {
        self.records.get(id).map(DeviceRecord::snapshot)
    }

    /// All registered devices, sorted by name.
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let mut snapshots: Vec<_> = self.records.values().map(DeviceRecord::snapshot).collect();
        snapshots.sort_by(|a, b| {
            a.device
                .name()
                .cmp(b.device.name())
                .then_with(|| a.device.id().cmp(b.device.id()))
        });
        snapshots
    }

    /// Translate one raw event, updating the registry. Returns the event to
    /// publish, if any.
    pub fn apply(
        &mut self,
        event: RawDeviceEvent,
        source: &dyn DeviceEventSource,
    ) -> Option<DeviceEvent> {
        if !self.active {
            return None;
        }

        if event.connection.contains(ConnectionKind::NETWORK) && !self.detect_network_devices {
            trace!(device = %event.id, "Ignoring network device event");
            return None;
        }

        match event.kind {
            RawEventKind::Added | RawEventKind::Paired => self.attach(event, source),
            RawEventKind::Removed => self.detach(event),
        }
    }

    fn attach(&mut self, event: RawDeviceEvent, source: &dyn DeviceEventSource) -> Option<DeviceEvent> {
        if let Some(record) = self.records.get(&event.id) {
            let current = *record.connection.borrow();
            if current.contains(event.connection) {
                return None;
            }
            record.connection.send_replace(current | event.connection);
            debug!(device = %event.id, connection = %(current | event.connection), "Device connection changed");
            return Some(DeviceEvent::Changed(record.snapshot()));
        }

        let name = match event
            .name
            .clone()
            .or_else(|| source.device_name(&event.id, event.connection))
        {
            Some(name) => name,
            None => {
                debug!(device = %event.id, "Dropping device without a name");
                return None;
            }
        };

        let (tx, rx) = watch::channel(event.connection);
        let device = source.make_device(DeviceInfo::new(event.id.clone(), name), rx);
        let record = DeviceRecord {
            device,
            connection: tx,
        };
        let snapshot = record.snapshot();
        debug!(device = %snapshot.device, "Device registered");
        self.records.insert(event.id, record);

        Some(match event.kind {
            RawEventKind::Paired => DeviceEvent::Paired(snapshot),
            _ => DeviceEvent::Connected(snapshot),
        })
    }

    fn detach(&mut self, event: RawDeviceEvent) -> Option<DeviceEvent> {
        let record = self.records.get(&event.id)?;
        let current = *record.connection.borrow();
        if !current.contains(event.connection) {
            trace!(device = %event.id, connection = %event.connection, "Removal for unknown connection");
            return None;
        }

        let mut remaining = current;
        remaining.remove(event.connection);
        record.connection.send_replace(remaining);

        if !remaining.is_empty() {
            debug!(device = %event.id, connection = %remaining, "Device connection changed");
            return Some(DeviceEvent::Changed(record.snapshot()));
        }

        let record = self.records.remove(&event.id)?;
        debug!(device = %event.id, "Device removed");
        Some(DeviceEvent::Disconnected(record.snapshot()))
    }

    /// Remove every device, returning a disconnect event for each.
    pub fn drain(&mut self) -> Vec<DeviceEvent> {
        let mut events: Vec<_> = self
            .records
            .drain()
            .map(|(_, record)| {
                record.connection.send_replace(ConnectionKind::NONE);
                DeviceEvent::Disconnected(record.snapshot())
            })
            .collect();
        events.sort_by(|a, b| a.device().name().cmp(b.device().name()));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BackendKind, SimulatedDevice, SimulatorBridge};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct NullBridge;

    impl SimulatorBridge for NullBridge {
        fn set_location(&self, _latitude: f64, _longitude: f64) -> bool {
            true
        }
    }

    /// Names every device after its id, except ids starting with "anon".
    struct TestSource;

    impl DeviceEventSource for TestSource {
        fn backend(&self) -> BackendKind {
            BackendKind::Simulated
        }
        fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<RawDeviceEvent>> {
            None
        }
        fn unsubscribe(&self) -> bool {
            false
        }
        fn device_name(&self, id: &DeviceId, _connection: ConnectionKind) -> Option<String> {
            (!id.as_str().starts_with("anon")).then(|| format!("Device {}", id))
        }
        fn make_device(&self, info: DeviceInfo, _connection: watch::Receiver<ConnectionKind>) -> Device {
            SimulatedDevice::new(info, Arc::new(NullBridge)).into()
        }
    }

    const USB: ConnectionKind = ConnectionKind::USB;
    const NETWORK: ConnectionKind = ConnectionKind::NETWORK;

    #[test]
    fn test_second_connection_merges_into_one_record() {
        let mut registry = DeviceRegistry::new(true);

        let first = registry.apply(RawDeviceEvent::added("X", USB), &TestSource);
        let second = registry.apply(RawDeviceEvent::added("X", NETWORK), &TestSource);

        assert!(matches!(first, Some(DeviceEvent::Connected(ref s)) if s.connection == USB));
        assert!(matches!(second, Some(DeviceEvent::Changed(ref s)) if s.connection == USB | NETWORK));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&DeviceId::from("X")).unwrap().connection,
            USB | NETWORK
        );
    }

    #[test]
    fn test_duplicate_add_emits_nothing() {
        let mut registry = DeviceRegistry::new(true);
        registry.apply(RawDeviceEvent::added("X", USB), &TestSource);
        assert!(registry
            .apply(RawDeviceEvent::added("X", USB), &TestSource)
            .is_none());
    }

    #[test]
    fn test_paired_event_for_new_device() {
        let mut registry = DeviceRegistry::new(true);
        let event = registry.apply(RawDeviceEvent::paired("X", USB), &TestSource);
        assert!(matches!(event, Some(DeviceEvent::Paired(_))));
    }

    #[test]
    fn test_remove_one_of_two_connections() {
        let mut registry = DeviceRegistry::new(true);
        registry.apply(RawDeviceEvent::added("X", USB), &TestSource);
        registry.apply(RawDeviceEvent::added("X", NETWORK), &TestSource);

        let event = registry.apply(RawDeviceEvent::removed("X", USB), &TestSource);
        assert!(matches!(event, Some(DeviceEvent::Changed(ref s)) if s.connection == NETWORK));

        let event = registry.apply(RawDeviceEvent::removed("X", NETWORK), &TestSource);
        assert!(matches!(event, Some(DeviceEvent::Disconnected(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_ignored() {
        let mut registry = DeviceRegistry::new(true);
        assert!(registry
            .apply(RawDeviceEvent::removed("ghost", USB), &TestSource)
            .is_none());

        registry.apply(RawDeviceEvent::added("X", USB), &TestSource);
        assert!(registry
            .apply(RawDeviceEvent::removed("X", NETWORK), &TestSource)
            .is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_network_events_filtered() {
        let mut registry = DeviceRegistry::new(false);
        assert!(registry
            .apply(RawDeviceEvent::added("X", NETWORK), &TestSource)
            .is_none());
        assert!(registry.is_empty());
        assert!(registry
            .apply(RawDeviceEvent::added("X", USB), &TestSource)
            .is_some());
    }

    #[test]
    fn test_name_from_event_or_source() {
        let mut registry = DeviceRegistry::new(true);

        assert!(registry
            .apply(RawDeviceEvent::added("anon-1", USB), &TestSource)
            .is_none());

        let event = registry
            .apply(
                RawDeviceEvent::added("anon-2", USB).with_name("Named"),
                &TestSource,
            )
            .unwrap();
        assert_eq!(event.device().name(), "Named");

        let event = registry
            .apply(RawDeviceEvent::added("B", USB), &TestSource)
            .unwrap();
        assert_eq!(event.device().name(), "Device B");
    }

    #[test]
    fn test_drain_disconnects_everything() {
        let mut registry = DeviceRegistry::new(true);
        registry.apply(RawDeviceEvent::added("B", USB), &TestSource);
        registry.apply(RawDeviceEvent::added("A", USB), &TestSource);

        let events = registry.drain();
        let names: Vec<_> = events.iter().map(|e| e.device().name().to_string()).collect();
        assert_eq!(names, vec!["Device A", "Device B"]);
        assert!(events
            .iter()
            .all(|e| matches!(e, DeviceEvent::Disconnected(s) if s.connection.is_empty())));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_inactive_registry_ignores_events() {
        let mut registry = DeviceRegistry::new(true);
        registry.set_active(false);
        assert!(registry
            .apply(RawDeviceEvent::added("X", USB), &TestSource)
            .is_none());
    }
}
