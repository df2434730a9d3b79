// src/device/connection.rs
//! Connection kind bit-set and the lookup policy derived from it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// How a device is reachable. Several kinds can be active at once, e.g. a
/// phone that is paired over Wi-Fi and additionally plugged in via USB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConnectionKind(u8);

impl ConnectionKind {
    pub const NONE: ConnectionKind = ConnectionKind(0);
    pub const UNKNOWN: ConnectionKind = ConnectionKind(1 << 0);
    pub const USB: ConnectionKind = ConnectionKind(1 << 1);
    pub const NETWORK: ConnectionKind = ConnectionKind(1 << 2);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: ConnectionKind) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ConnectionKind) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ConnectionKind) {
        self.0 &= !other.0;
    }

    /// Lookup mode for this kind, without any network preference.
    pub fn lookup_mode(&self) -> LookupMode {
        if *self == ConnectionKind::USB {
            LookupMode::Usb
        } else if *self == ConnectionKind::NETWORK {
            LookupMode::Network
        } else {
            LookupMode::Both {
                prefer_network: false,
            }
        }
    }
}

impl BitOr for ConnectionKind {
    type Output = ConnectionKind;

    fn bitor(self, rhs: ConnectionKind) -> ConnectionKind {
        ConnectionKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for ConnectionKind {
    fn bitor_assign(&mut self, rhs: ConnectionKind) {
        self.insert(rhs);
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (ConnectionKind::USB, "usb"),
            (ConnectionKind::NETWORK, "network"),
            (ConnectionKind::UNKNOWN, "unknown"),
        ]
        .iter()
        .filter(|(kind, _)| self.contains(*kind))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

/// Which transports the protocol bridge should try when talking to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Usb,
    Network,
    Both { prefer_network: bool },
}

impl LookupMode {
    /// Lookup mode for `kind`, honouring a network preference when the device
    /// is reachable over the network at all.
    pub fn for_connection(kind: ConnectionKind, prefer_network: bool) -> Self {
        match kind.lookup_mode() {
            LookupMode::Both { .. } => LookupMode::Both {
                prefer_network: prefer_network && kind.contains(ConnectionKind::NETWORK),
            },
            mode => mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut kind = ConnectionKind::USB;
        kind.insert(ConnectionKind::NETWORK);
        assert!(kind.contains(ConnectionKind::USB));
        assert!(kind.contains(ConnectionKind::NETWORK));

        kind.remove(ConnectionKind::USB);
        assert_eq!(kind, ConnectionKind::NETWORK);

        kind.remove(ConnectionKind::NETWORK);
        assert!(kind.is_empty());
    }

    #[test]
    fn test_lookup_mode() {
        assert_eq!(ConnectionKind::USB.lookup_mode(), LookupMode::Usb);
        assert_eq!(ConnectionKind::NETWORK.lookup_mode(), LookupMode::Network);
        assert_eq!(
            (ConnectionKind::USB | ConnectionKind::NETWORK).lookup_mode(),
            LookupMode::Both {
                prefer_network: false
            }
        );
    }

    #[test]
    fn test_prefer_network_only_applies_to_network_devices() {
        let both = ConnectionKind::USB | ConnectionKind::NETWORK;
        assert_eq!(
            LookupMode::for_connection(both, true),
            LookupMode::Both {
                prefer_network: true
            }
        );
        assert_eq!(
            LookupMode::for_connection(ConnectionKind::UNKNOWN, true),
            LookupMode::Both {
                prefer_network: false
            }
        );
        assert_eq!(
            LookupMode::for_connection(ConnectionKind::USB, true),
            LookupMode::Usb
        );
    }

    #[test]
    fn test_display() {
        let kind = ConnectionKind::USB | ConnectionKind::NETWORK;
        assert_eq!(kind.to_string(), "usb, network");
        assert_eq!(ConnectionKind::NONE.to_string(), "none");
    }
}
