//! Indicator discovery and the hidraw transport
//!
//! Indicators enumerate as Arduino Pro Micro HID devices whose product
//! string starts with `Turbo LEDz`. Discovery reads each
//! `<sys>/class/hidraw/hidrawN/device/uevent`, and matching nodes under
//! `<dev>` are opened for writing once udev has made them world read/write.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use turboledz_core::device::PRODUCT_PREFIX;
use turboledz_core::{DeviceModel, DeviceRecord, ReportWriter};

pub const VENDOR_ID: u32 = 0x2341;
pub const PRODUCT_ID: u32 = 0x8037;

/// Devices driven at once; further matches are skipped.
pub const MAX_DEVICES: usize = 6;

pub const PERMISSION_RETRIES: u32 = 5;
pub const PERMISSION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DeviceOpenError {
    #[error("Cannot stat {path}: {source}")]
    Vanished {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No rw-permission for {path} (mode {mode:04o}) after {retries} retries")]
    PermissionDenied { path: PathBuf, mode: u32, retries: u32 },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeviceOpenError {
    /// sysexits status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            DeviceOpenError::Vanished { .. } => 66,
            DeviceOpenError::PermissionDenied { .. } => 77,
            DeviceOpenError::Open { .. } => 74,
        }
    }
}

/// An opened `/dev/hidrawN` node
#[derive(Debug)]
pub struct HidrawDevice {
    path: PathBuf,
    file: File,
}

impl HidrawDevice {
    pub fn open(path: &Path) -> Result<Self, DeviceOpenError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| DeviceOpenError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl ReportWriter for HidrawDevice {
    fn write_report(&mut self, report: &[u8]) -> std::io::Result<usize> {
        self.file.write(report)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// A matching hidraw node, not yet opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub node: PathBuf,
    pub product: String,
    pub model: DeviceModel,
}

/// Fields of a hidraw parent's uevent file
#[derive(Debug, Clone, PartialEq, Eq)]
struct HidIdentity {
    vendor: u32,
    product: u32,
    name: String,
}

/// `HID_ID=bus:vendor:product` (hex) and `HID_NAME=...`.
fn parse_uevent(content: &str) -> Option<HidIdentity> {
    let mut ids = None;
    let mut name = None;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("HID_ID=") {
            let mut parts = value.split(':').skip(1);
            let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
            let product = u32::from_str_radix(parts.next()?, 16).ok()?;
            ids = Some((vendor, product));
        } else if let Some(value) = line.strip_prefix("HID_NAME=") {
            name = Some(value.trim().to_string());
        }
    }
    let (vendor, product) = ids?;
    Some(HidIdentity {
        vendor,
        product,
        name: name?,
    })
}

/// Where to look for indicators
#[derive(Debug, Clone)]
pub struct Discovery {
    sys_root: PathBuf,
    dev_root: PathBuf,
    retries: u32,
    interval: Duration,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::with_roots("/sys", "/dev")
    }
}

impl Discovery {
    pub fn with_roots(sys_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            dev_root: dev_root.into(),
            retries: PERMISSION_RETRIES,
            interval: PERMISSION_INTERVAL,
        }
    }

    /// Matching nodes in hidraw index order, at most [`MAX_DEVICES`].
    pub fn enumerate(&self) -> Vec<Candidate> {
        let class_dir = self.sys_root.join("class/hidraw");
        let entries = match std::fs::read_dir(&class_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", class_dir.display(), e);
                return Vec::new();
            }
        };

        let mut found: Vec<(usize, Candidate)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let index: usize = name.strip_prefix("hidraw")?.parse().ok()?;
                let uevent = std::fs::read_to_string(entry.path().join("device/uevent")).ok()?;
                let identity = parse_uevent(&uevent)?;
                debug!(
                    "{}: {:04x}:{:04x} '{}'",
                    name, identity.vendor, identity.product, identity.name
                );
                if identity.vendor != VENDOR_ID || identity.product != PRODUCT_ID {
                    return None;
                }
                let Some(model) = DeviceModel::from_product(&identity.name) else {
                    debug!("Skipped {} for lack of a {} product name", name, PRODUCT_PREFIX);
                    return None;
                };
                Some((
                    index,
                    Candidate {
                        node: self.dev_root.join(&name),
                        product: identity.name,
                        model,
                    },
                ))
            })
            .collect();

        found.sort_by_key(|(index, _)| *index);
        info!("Found {} Turbo LEDz devices", found.len());

        if found.len() > MAX_DEVICES {
            for (_, skipped) in &found[MAX_DEVICES..] {
                warn!(
                    "Skipping {} ({}): at most {} devices are supported",
                    skipped.node.display(),
                    skipped.product,
                    MAX_DEVICES
                );
            }
            found.truncate(MAX_DEVICES);
        }
        found.into_iter().map(|(_, c)| c).collect()
    }

    /// Wait until `path` is world read/write, re-checking once per interval.
    pub async fn await_permissions(&self, path: &Path) -> Result<(), DeviceOpenError> {
        let mut attempt = 0;
        loop {
            let mode = node_mode(path)?;
            if mode & 0o006 == 0o006 {
                return Ok(());
            }
            if attempt == self.retries {
                return Err(DeviceOpenError::PermissionDenied {
                    path: path.to_path_buf(),
                    mode: mode & 0o7777,
                    retries: self.retries,
                });
            }
            attempt += 1;
            warn!(
                "No rw-permission for {} (mode {:04o}), retry {}/{}",
                path.display(),
                mode & 0o7777,
                attempt,
                self.retries
            );
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Open every candidate; the first failure aborts.
    pub async fn open_all(
        &self,
        candidates: &[Candidate],
    ) -> Result<Vec<DeviceRecord<HidrawDevice>>, DeviceOpenError> {
        let mut records = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.await_permissions(&candidate.node).await?;
            let device = HidrawDevice::open(&candidate.node)?;
            let record = DeviceRecord::new(device, candidate.model);
            info!(
                "Opened {} at {} ({} segments)",
                record.model,
                candidate.node.display(),
                record.segments
            );
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(unix)]
fn node_mode(path: &Path) -> Result<u32, DeviceOpenError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode())
        .map_err(|source| DeviceOpenError::Vanished {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn node_mode(path: &Path) -> Result<u32, DeviceOpenError> {
    std::fs::metadata(path)
        .map(|_| 0o666)
        .map_err(|source| DeviceOpenError::Vanished {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use turboledz_devkit::fixtures::INDICATOR_HID_ID;
    use turboledz_devkit::FakeHost;

    fn discovery(host: &FakeHost) -> Discovery {
        Discovery::with_roots(host.sys_root(), host.dev_root())
    }

    #[test]
    fn test_parse_uevent() {
        let identity = parse_uevent(
            "DRIVER=hid-generic\nHID_ID=0003:00002341:00008037\nHID_NAME=Turbo LEDz 810c\n",
        )
        .unwrap();
        assert_eq!(identity.vendor, VENDOR_ID);
        assert_eq!(identity.product, PRODUCT_ID);
        assert_eq!(identity.name, "Turbo LEDz 810c");

        assert!(parse_uevent("HID_NAME=no id\n").is_none());
        assert!(parse_uevent("HID_ID=0003:zz:8037\nHID_NAME=x\n").is_none());
    }

    #[test]
    fn test_enumerate_filters_and_orders() {
        let host = FakeHost::new().unwrap();
        host.add_indicator(3, "Turbo LEDz 108").unwrap();
        host.add_indicator(1, "Turbo LEDz 810c").unwrap();
        host.add_hidraw(0, "0003:0000046D:0000C52B", "Logitech Receiver", 0o600)
            .unwrap();
        host.add_hidraw(2, INDICATOR_HID_ID, "Arduino Micro", 0o666).unwrap();

        let found = discovery(&host).enumerate();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].model, DeviceModel::Model810c);
        assert_eq!(found[0].node, host.dev_root().join("hidraw1"));
        assert_eq!(found[1].model, DeviceModel::Model108);
    }

    #[test]
    fn test_enumerate_caps_device_count() {
        let host = FakeHost::new().unwrap();
        for i in 0..8 {
            host.add_indicator(i, "Turbo LEDz 810").unwrap();
        }
        let found = discovery(&host).enumerate();
        assert_eq!(found.len(), MAX_DEVICES);
        assert_eq!(found[5].node, host.dev_root().join("hidraw5"));
    }

    #[test]
    fn test_enumerate_without_hidraw_class() {
        let host = FakeHost::new().unwrap();
        assert!(discovery(&host).enumerate().is_empty());
    }

    #[tokio::test]
    async fn test_open_and_write() {
        let host = FakeHost::new().unwrap();
        let node = host.add_indicator(0, "Turbo LEDz 88s").unwrap();

        let disc = discovery(&host);
        let candidates = disc.enumerate();
        let mut records = disc.open_all(&candidates).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].segments, 8);

        records[0].write(&[0x00, 0x84]).unwrap();
        drop(records);
        assert_eq!(std::fs::read(node).unwrap(), vec![0x00, 0x84]);
    }

    #[cfg(unix)]
    #[tokio::test(start_paused = true)]
    async fn test_permission_wait_gives_up() {
        let host = FakeHost::new().unwrap();
        let node = host.add_hidraw(0, INDICATOR_HID_ID, "Turbo LEDz 810", 0o600).unwrap();

        let start = tokio::time::Instant::now();
        let err = discovery(&host).await_permissions(&node).await.unwrap_err();
        assert!(matches!(err, DeviceOpenError::PermissionDenied { retries: 5, .. }));
        assert_eq!(err.exit_code(), 77);
        assert!(start.elapsed() >= PERMISSION_INTERVAL * PERMISSION_RETRIES);
    }

    #[cfg(unix)]
    #[tokio::test(start_paused = true)]
    async fn test_permission_wait_sees_late_udev_rule() {
        use std::os::unix::fs::PermissionsExt;

        let host = FakeHost::new().unwrap();
        let node = host.add_hidraw(0, INDICATOR_HID_ID, "Turbo LEDz 810", 0o600).unwrap();
        let disc = discovery(&host);

        let chmod_target = node.clone();
        let udev = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            std::fs::set_permissions(&chmod_target, std::fs::Permissions::from_mode(0o666)).unwrap();
        });

        disc.await_permissions(&node).await.unwrap();
        udev.await.unwrap();
    }

    #[tokio::test]
    async fn test_vanished_node() {
        let host = FakeHost::new().unwrap();
        let err = discovery(&host)
            .await_permissions(&host.dev_root().join("hidraw9"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 66);
    }
}
