// src/error.rs
//! Error types for the location spoofer

use std::fmt;

pub type Result<T> = std::result::Result<T, SpoofError>;

/// Errors raised while pairing a physical device and mounting its support image.
///
/// Every variant is terminal for the `pair()` call that produced it. Nothing
/// is retried internally; a caller that receives `SupportImageNotFound` may
/// fetch the files for `os`/`version` and call `pair()` again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The handshake with the device failed.
    Pairing(String),
    /// The support image cache could not be accessed.
    Permission(String),
    /// No support image is cached for this platform and version.
    SupportImageNotFound { os: String, version: String },
    /// The support image exists but could not be mounted.
    Mount { os: String, version: String },
    /// The product name or version could not be read from the device.
    ProductInfo(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Pairing(msg) => write!(f, "Pairing error: {}", msg),
            DeviceError::Permission(msg) => write!(f, "Permission error: {}", msg),
            DeviceError::SupportImageNotFound { os, version } => {
                write!(f, "Support image not found for {} {}", os, version)
            }
            DeviceError::Mount { os, version } => {
                write!(f, "Could not mount support image for {} {}", os, version)
            }
            DeviceError::ProductInfo(msg) => write!(f, "Product info error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

#[derive(Debug)]
pub enum SpoofError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Device(DeviceError),
    /// The engine task is gone, usually because it was shut down.
    EngineClosed,
    Other(String),
}

impl fmt::Display for SpoofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpoofError::Io(e) => write!(f, "IO error: {}", e),
            SpoofError::Json(e) => write!(f, "JSON error: {}", e),
            SpoofError::Device(e) => write!(f, "Device error: {}", e),
            SpoofError::EngineClosed => write!(f, "Location spoofer is no longer running"),
            SpoofError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SpoofError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpoofError::Io(e) => Some(e),
            SpoofError::Json(e) => Some(e),
            SpoofError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SpoofError {
    fn from(error: std::io::Error) -> Self {
        SpoofError::Io(error)
    }
}

impl From<serde_json::Error> for SpoofError {
    fn from(error: serde_json::Error) -> Self {
        SpoofError::Json(error)
    }
}

impl From<DeviceError> for SpoofError {
    fn from(error: DeviceError) -> Self {
        SpoofError::Device(error)
    }
}

impl From<anyhow::Error> for SpoofError {
    fn from(error: anyhow::Error) -> Self {
        SpoofError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_image_error_carries_platform() {
        let err = DeviceError::SupportImageNotFound {
            os: "iPhone OS".to_string(),
            version: "16.4".to_string(),
        };
        assert_eq!(err.to_string(), "Support image not found for iPhone OS 16.4");
    }

    #[test]
    fn test_device_error_converts() {
        let err: SpoofError = DeviceError::Pairing("no trust".to_string()).into();
        assert!(matches!(err, SpoofError::Device(DeviceError::Pairing(_))));
        assert_eq!(err.to_string(), "Device error: Pairing error: no trust");
    }
}
