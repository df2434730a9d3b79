// src/device/support.rs
//! Support image lookup for physical devices
//!
//! A physical device only accepts location commands after the platform
//! support image for its OS version is mounted. This module only resolves
//! where those files live and whether they are there; fetching them is left
//! to the host.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const IMAGE_FILE: &str = "DeveloperDiskImage.dmg";
const BUILD_MANIFEST_FILE: &str = "BuildManifest.plist";

/// Local paths of all files that may belong to one support image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportImage {
    pub os: String,
    pub version: String,
    pub image: PathBuf,
    pub signature: PathBuf,
    pub trustcache: PathBuf,
    pub build_manifest: PathBuf,
}

impl SupportImage {
    /// Describe the files for `os`/`version` inside `version_dir`.
    pub fn in_directory(version_dir: &Path, os: &str, version: &str) -> Self {
        let image = version_dir.join(IMAGE_FILE);
        Self {
            os: os.to_string(),
            version: version.to_string(),
            signature: with_suffix(&image, ".signature"),
            trustcache: with_suffix(&image, ".trustcache"),
            build_manifest: version_dir.join(BUILD_MANIFEST_FILE),
            image,
        }
    }

    /// Image and signature, as used by the classic mount protocol.
    pub fn has_signed_files(&self) -> bool {
        is_file(&self.image) && is_file(&self.signature)
    }

    /// Image, trustcache and build manifest, as used by personalized images.
    pub fn has_personalized_files(&self) -> bool {
        is_file(&self.image) && is_file(&self.trustcache) && is_file(&self.build_manifest)
    }

    pub fn is_complete(&self) -> bool {
        self.has_signed_files() || self.has_personalized_files()
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Resolves support images for an OS name and version.
pub trait SupportImageStore: Send + Sync {
    /// Paths for the image files. An error means the cache itself could not be
    /// accessed, not that the files are missing.
    fn resolve(&self, os: &str, version: &str) -> io::Result<SupportImage>;

    /// Whether all files needed to mount `image` are available.
    fn is_present(&self, image: &SupportImage) -> bool {
        image.is_complete()
    }
}

/// Support images cached as `<root>/<os>/<version>/DeveloperDiskImage.dmg`.
#[derive(Debug, Clone)]
pub struct DirectoryImageStore {
    root: PathBuf,
}

impl DirectoryImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$HOME/.local/share/location-spoofer/DeveloperDiskImages`
    pub fn default_root() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("location-spoofer")
                .join("DeveloperDiskImages")
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, os: &str, version: &str) -> PathBuf {
        self.root.join(os).join(version)
    }

    /// Versions for `os` that contain at least an image file, newest first.
    pub fn available_versions(&self, os: &str) -> io::Result<Vec<String>> {
        let os_dir = self.root.join(os);
        if !os_dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&os_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !is_version_string(&name) {
                continue;
            }

            if entry.path().join(IMAGE_FILE).is_file() {
                versions.push(name);
            } else {
                warn!(path = %entry.path().display(), "Skipping support image directory without image");
            }
        }

        versions.sort_by(|a, b| compare_versions(b, a));
        Ok(versions)
    }

    /// Delete every cached file for `os`/`version`.
    pub fn remove(&self, os: &str, version: &str) -> io::Result<()> {
        fs::remove_dir_all(self.version_dir(os, version))
    }
}

impl SupportImageStore for DirectoryImageStore {
    fn resolve(&self, os: &str, version: &str) -> io::Result<SupportImage> {
        let version_dir = self.version_dir(os, version);
        fs::create_dir_all(&version_dir)?;
        Ok(SupportImage::in_directory(&version_dir, os, version))
    }
}

fn is_version_string(value: &str) -> bool {
    !value.is_empty() && value.split('.').all(|part| part.parse::<u32>().is_ok())
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    parse(a).cmp(&parse(b))
}

/// Reduce a product version such as `16.4.1` to `16.4`; `17` becomes `17.0`.
pub fn major_minor(version: &str) -> Option<String> {
    let mut parts = version.split('.').filter(|p| !p.is_empty());
    let major = parts.next()?;
    let minor = parts.next().unwrap_or("0");
    Some(format!("{}.{}", major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_resolve_creates_version_directory() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(dir.path());

        let image = store.resolve("iPhone OS", "16.4").unwrap();

        assert!(dir.path().join("iPhone OS").join("16.4").is_dir());
        assert_eq!(image.image.file_name().unwrap(), "DeveloperDiskImage.dmg");
        assert_eq!(
            image.signature.file_name().unwrap(),
            "DeveloperDiskImage.dmg.signature"
        );
        assert_eq!(
            image.trustcache.file_name().unwrap(),
            "DeveloperDiskImage.dmg.trustcache"
        );
        assert!(!store.is_present(&image));
    }

    #[test]
    fn test_present_with_signature_or_personalized_files() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(dir.path());

        let signed = store.resolve("iPhone OS", "15.0").unwrap();
        touch(&signed.image);
        assert!(!store.is_present(&signed));
        touch(&signed.signature);
        assert!(store.is_present(&signed));

        let personalized = store.resolve("iPhone OS", "17.0").unwrap();
        touch(&personalized.image);
        touch(&personalized.trustcache);
        assert!(!store.is_present(&personalized));
        touch(&personalized.build_manifest);
        assert!(store.is_present(&personalized));
    }

    #[test]
    fn test_available_versions_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(dir.path());

        for version in ["9.3", "15.0", "10.2"] {
            let image = store.resolve("iPhone OS", version).unwrap();
            touch(&image.image);
        }
        // no image inside, must be skipped
        store.resolve("iPhone OS", "16.0").unwrap();
        fs::create_dir_all(dir.path().join("iPhone OS").join("notes")).unwrap();

        let versions = store.available_versions("iPhone OS").unwrap();
        assert_eq!(versions, vec!["15.0", "10.2", "9.3"]);
        assert!(store.available_versions("watchOS").unwrap().is_empty());
    }

    #[test]
    fn test_remove_version() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(dir.path());
        store.resolve("iPhone OS", "15.0").unwrap();

        store.remove("iPhone OS", "15.0").unwrap();
        assert!(!store.version_dir("iPhone OS", "15.0").exists());
    }

    #[test]
    fn test_major_minor() {
        assert_eq!(major_minor("16.4.1").as_deref(), Some("16.4"));
        assert_eq!(major_minor("17").as_deref(), Some("17.0"));
        assert_eq!(major_minor(""), None);
    }
}
