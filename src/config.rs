// src/config.rs
//! Configuration stored as JSON in the user's config directory

use crate::device::{DirectoryImageStore, MobileDeviceService};
use crate::discovery::{EventFeed, PhysicalEventSource};
use crate::error::{Result, SpoofError};
use crate::spoofer::MoveType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Interval between two automatic movement steps.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoofConfig {
    pub tick_interval_ms: u64,
    pub move_type: MoveType,
    pub detect_network_devices: bool,
    pub prefer_network_connection: bool,
    /// Root of the support image cache. Defaults to the user's data directory.
    pub support_directory: Option<PathBuf>,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            move_type: MoveType::Walk,
            detect_network_devices: true,
            prefer_network_connection: false,
            support_directory: None,
        }
    }
}

impl SpoofConfig {
    /// Load configuration from the default location, or defaults if there is
    /// no config file yet
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| SpoofError::Other(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SpoofError::Other(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpoofError::Other(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)?;

        std::fs::write(path, contents)
            .map_err(|e| SpoofError::Other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// `$HOME/.config/location-spoofer/config.json`
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| SpoofError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("location-spoofer")
            .join("config.json"))
    }

    /// Tick interval, never shorter than one millisecond
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Support image cache at `support_directory`, or at the default location
    pub fn image_store(&self) -> Result<DirectoryImageStore> {
        self.support_directory
            .clone()
            .or_else(DirectoryImageStore::default_root)
            .map(DirectoryImageStore::new)
            .ok_or_else(|| SpoofError::Other("HOME environment variable not set".to_string()))
    }

    /// Event source for physical devices using this configuration's image
    /// cache and network preference
    pub fn physical_event_source(
        &self,
        feed: Arc<EventFeed>,
        service: Arc<dyn MobileDeviceService>,
    ) -> Result<PhysicalEventSource> {
        let images = self.image_store()?;
        Ok(PhysicalEventSource::new(feed, service, Arc::new(images))
            .with_prefer_network(self.prefer_network_connection))
    }

    pub fn update_move_type(&mut self, move_type: MoveType) {
        self.move_type = move_type;
    }

    pub fn update_tick_interval(&mut self, interval: Duration) {
        self.tick_interval_ms = interval.as_millis().max(1) as u64;
    }

    /// Update the connection settings for physical devices
    pub fn update_network(&mut self, detect_network_devices: bool, prefer_network_connection: bool) {
        self.detect_network_devices = detect_network_devices;
        self.prefer_network_connection = prefer_network_connection;
    }

    pub fn update_support_directory(&mut self, directory: Option<PathBuf>) {
        self.support_directory = directory;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SpoofConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.move_type, MoveType::Walk);
        assert!(config.detect_network_devices);
        assert!(!config.prefer_network_connection);
        assert!(config.support_directory.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SpoofConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, SpoofConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = SpoofConfig::default();
        config.update_move_type(MoveType::Car);
        config.update_network(false, true);
        config.update_support_directory(Some(PathBuf::from("/srv/images")));
        config.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"move_type\": \"car\""));
        assert_eq!(SpoofConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "move_type": "cycle" }"#).unwrap();

        let config = SpoofConfig::load_from(&path).unwrap();
        assert_eq!(config.move_type, MoveType::Cycle);
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SpoofConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_image_store_uses_support_directory() {
        let dir = TempDir::new().unwrap();
        let mut config = SpoofConfig::default();
        config.update_support_directory(Some(dir.path().to_path_buf()));

        let store = config.image_store().unwrap();
        assert_eq!(store.root(), dir.path());
    }

    #[test]
    fn test_update_tick_interval() {
        let mut config = SpoofConfig::default();
        config.update_tick_interval(Duration::from_micros(10));
        assert_eq!(config.tick_interval_ms, 1);
        config.update_tick_interval(Duration::from_secs(1));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
