//! Enumeration of connected devices from `adb devices -l`.
//!
//! Only lines in the `device` state with a full product/model/device triple
//! are devices. The banner, `unauthorized` and `offline` lines, and blank
//! lines do not match and are skipped.

use std::sync::LazyLock;

use protocol::{Entry, EntryKind};
use regex::Regex;
use serde::Serialize;

use crate::location;

/// Icon name hint sent with every device entry.
pub const DEVICE_ICON: &str = "smartphone";

/// Mime type of directory-like entries.
pub const DIRECTORY_MIME: &str = "inode/directory";

/// `<id> device [usb:<transport>] product:<p> model:<m> device:<d> [...]`
static DEVICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^(?P<id>\S+)[ \t]+device[ \t]+(?:usb:(?P<usb>\S+)[ \t]+)?",
        r"product:(?P<product>\S+)[ \t]+model:(?P<model>\S+)[ \t]+device:(?P<device>\S+)",
    ))
    .expect("device line pattern is valid")
});

/// A device reported by the bridge tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Serial or network address assigned by adb.
    pub id: String,
    pub model: String,
    pub product: String,
    /// Device codename.
    pub device: String,
    /// USB transport descriptor, absent for network devices.
    pub usb: Option<String>,
}

impl Device {
    /// The directory entry shown for this device at the virtual root.
    pub fn to_entry(&self) -> Entry {
        let url = match location::device_url(&self.id, "/") {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::warn!(
                    device = %self.id,
                    error = %e,
                    "device id is not a valid url authority"
                );
                None
            }
        };

        Entry {
            display_name: Some(self.model.clone()),
            mode: 0o444,
            url,
            mime_type: Some(DIRECTORY_MIME.to_string()),
            icon_name: Some(DEVICE_ICON.to_string()),
            ..Entry::new(self.id.clone(), EntryKind::Directory)
        }
    }
}

/// Parse the merged output of `adb devices -l`.
pub fn parse_devices(output: &str) -> impl Iterator<Item = Device> + '_ {
    DEVICE_LINE.captures_iter(output).map(|caps| Device {
        id: caps["id"].to_string(),
        model: caps["model"].to_string(),
        product: caps["product"].to_string(),
        device: caps["device"].to_string(),
        usb: caps.name("usb").map(|m| m.as_str().to_string()),
    })
}
