// src/lib.rs
//! Location Spoofer Library
//!
//! Impersonates the GPS position of an attached device or simulator and moves
//! it along a heading or a route at walking, cycling or driving speed.

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod geo;
pub mod logging;
pub mod spoofer;

// Re-export main types for convenience
pub use config::SpoofConfig;
pub use device::{ConnectionKind, Device, DeviceId, DeviceInfo};
pub use discovery::{DeviceDiscovery, DeviceEvent};
pub use error::{DeviceError, Result, SpoofError};
pub use geo::Coordinate;
pub use spoofer::{LocationSpoofer, MoveState, MoveType, SpooferDelegate, SpooferOptions, SpooferState};
