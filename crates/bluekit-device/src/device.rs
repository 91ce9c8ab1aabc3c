//! Bluetooth device snapshot model.

use std::collections::HashSet;
use std::fmt;

/// A2DP Source UUID (the remote device sends audio).
pub const A2DP_SOURCE_UUID: &str = "0000110a-0000-1000-8000-00805f9b34fb";

/// A2DP Sink UUID (the remote device receives audio).
pub const A2DP_SINK_UUID: &str = "0000110b-0000-1000-8000-00805f9b34fb";

/// Bluetooth device address in canonical colon-separated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(pub String);

impl Address {
    /// Create from a MAC address string (e.g., "00:11:22:33:44:55").
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into().to_uppercase())
    }

    /// The `dev_XX_XX_...` form used in BlueZ object paths.
    pub fn to_path_component(&self) -> String {
        format!("dev_{}", self.0.replace(':', "_"))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<bluer::Address> for Address {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.to_string().to_uppercase())
    }
}

/// Audio role advertised by a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2dpRole {
    /// The remote sends audio to us.
    Source,
    /// The remote accepts audio from us.
    Sink,
}

/// Snapshot of a device as reported by the daemon.
///
/// Only as fresh as the registry query that produced it; re-query to
/// observe state changes.
#[derive(Debug, Clone)]
pub struct BluetoothDevice {
    /// Device Bluetooth address.
    pub address: Address,
    /// Device name (may be "Unknown" if not yet resolved).
    pub name: String,
    /// Device alias (user-friendly name).
    pub alias: Option<String>,
    /// Name of the adapter the device belongs to (e.g., "hci0").
    pub adapter: String,
    /// Whether the device is paired.
    pub paired: bool,
    /// Whether the device is connected.
    pub connected: bool,
    /// Whether the device is trusted.
    pub trusted: bool,
    /// Service UUIDs advertised by the device (lowercase).
    pub uuids: HashSet<String>,
    /// Received Signal Strength Indicator.
    pub rssi: Option<i16>,
    /// Device icon hint (e.g., "audio-card", "phone").
    pub icon: Option<String>,
}

impl BluetoothDevice {
    /// Get display name (alias if available, otherwise name).
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether the device advertises the given service UUID.
    pub fn supports_service(&self, uuid: &str) -> bool {
        self.uuids.contains(&uuid.to_lowercase())
    }

    /// Audio role advertised by the device, if it supports A2DP at all.
    ///
    /// A device advertising both role markers is reported as a source,
    /// matching how phones expose themselves.
    pub fn a2dp_role(&self) -> Option<A2dpRole> {
        if self.supports_service(A2DP_SOURCE_UUID) {
            Some(A2dpRole::Source)
        } else if self.supports_service(A2DP_SINK_UUID) {
            Some(A2dpRole::Sink)
        } else {
            None
        }
    }
}

impl Default for BluetoothDevice {
    fn default() -> Self {
        Self {
            address: Address::new("00:00:00:00:00:00"),
            name: "Unknown".to_string(),
            alias: None,
            adapter: String::new(),
            paired: false,
            connected: false,
            trusted: false,
            uuids: HashSet::new(),
            rssi: None,
            icon: None,
        }
    }
}
