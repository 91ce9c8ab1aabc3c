//! On-demand device registry.
//!
//! Query-only view of the devices the daemon knows about. Every query
//! rebuilds its snapshot from the daemon's object graph; nothing is
//! cached, so results are only as fresh as the call that produced them.

use std::collections::HashSet;

use bluer::{Adapter, Device};
use tracing::warn;

use crate::adapter::BluetoothAdapter;
use crate::device::{Address, BluetoothDevice};
use crate::error::{Error, Result};

/// Read-only registry of devices known to one adapter.
#[derive(Clone)]
pub struct DeviceRegistry {
    adapter: Adapter,
}

impl DeviceRegistry {
    /// Create a registry over the given adapter.
    pub fn new(adapter: &BluetoothAdapter) -> Self {
        Self {
            adapter: adapter.adapter().clone(),
        }
    }

    pub(crate) fn from_raw(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Snapshot of every device known to the adapter (discovered, paired,
    /// or connected).
    pub async fn devices(&self) -> Result<Vec<BluetoothDevice>> {
        let addresses = self
            .adapter
            .device_addresses()
            .await
            .map_err(|e| Error::Bus(format!("Failed to list devices: {}", e)))?;

        let mut devices = Vec::with_capacity(addresses.len());
        for addr in addresses {
            match self.adapter.device(addr) {
                Ok(device) => match self.snapshot(&device).await {
                    Ok(snapshot) => devices.push(snapshot),
                    Err(e) => warn!("Failed to read device {}: {}", addr, e),
                },
                Err(e) => warn!("Failed to get device {}: {}", addr, e),
            }
        }
        Ok(devices)
    }

    /// Snapshot of all currently paired devices.
    pub async fn paired_devices(&self) -> Result<Vec<BluetoothDevice>> {
        let devices = self.devices().await?;
        Ok(devices.into_iter().filter(|d| d.paired).collect())
    }

    /// Snapshot of all currently connected devices.
    pub async fn connected_devices(&self) -> Result<Vec<BluetoothDevice>> {
        let devices = self.devices().await?;
        Ok(devices.into_iter().filter(|d| d.connected).collect())
    }

    /// Look up one device by address.
    ///
    /// Returns [`Error::DeviceNotFound`] if the adapter does not know the
    /// address, distinct from bus-level failures.
    pub async fn device(&self, address: &Address) -> Result<BluetoothDevice> {
        let addr = parse_address(address)?;
        if !self.knows(addr).await? {
            return Err(Error::DeviceNotFound(address.clone()));
        }
        let device = self
            .adapter
            .device(addr)
            .map_err(|e| Error::Bus(format!("Failed to get device {}: {}", address, e)))?;
        self.snapshot(&device).await
    }

    /// Whether the adapter currently knows this address at all.
    pub async fn contains(&self, address: &Address) -> Result<bool> {
        let addr = parse_address(address)?;
        self.knows(addr).await
    }

    /// Whether the device is paired. Unknown devices are reported as not
    /// paired rather than as an error.
    pub async fn is_paired(&self, address: &Address) -> Result<bool> {
        match self.device(address).await {
            Ok(device) => Ok(device.paired),
            Err(Error::DeviceNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the device is connected. Unknown devices are reported as
    /// not connected rather than as an error.
    pub async fn is_connected(&self, address: &Address) -> Result<bool> {
        match self.device(address).await {
            Ok(device) => Ok(device.connected),
            Err(Error::DeviceNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn knows(&self, addr: bluer::Address) -> Result<bool> {
        let addresses = self
            .adapter
            .device_addresses()
            .await
            .map_err(|e| Error::Bus(format!("Failed to list devices: {}", e)))?;
        Ok(addresses.contains(&addr))
    }

    /// Read one device's properties into a snapshot, tolerating
    /// individually missing properties.
    pub(crate) async fn snapshot(&self, device: &Device) -> Result<BluetoothDevice> {
        let address = Address::from(device.address());

        let name = device
            .name()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| "Unknown".to_string());
        let alias = device.alias().await.ok();
        let paired = device.is_paired().await.unwrap_or(false);
        let connected = device.is_connected().await.unwrap_or(false);
        let trusted = device.is_trusted().await.unwrap_or(false);
        let rssi = device.rssi().await.ok().flatten();
        let icon = device.icon().await.ok().flatten();

        let uuids: HashSet<String> = device
            .uuids()
            .await
            .ok()
            .flatten()
            .map(|uuids| {
                uuids
                    .into_iter()
                    .map(|u| u.to_string().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        Ok(BluetoothDevice {
            address,
            name,
            alias,
            adapter: self.adapter.name().to_string(),
            paired,
            connected,
            trusted,
            uuids,
            rssi,
            icon,
        })
    }
}

pub(crate) fn parse_address(address: &Address) -> Result<bluer::Address> {
    address
        .0
        .parse()
        .map_err(|_| Error::InvalidAddress(address.0.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_garbage() {
        let result = parse_address(&Address::new("not-an-address"));
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn parse_accepts_canonical_form() {
        assert!(parse_address(&Address::new("aa:bb:cc:dd:ee:ff")).is_ok());
    }

    #[tokio::test]
    #[ignore = "requires real Bluetooth hardware"]
    async fn registry_lists_devices() {
        if let Ok(adapter) = BluetoothAdapter::new().await {
            let registry = DeviceRegistry::new(&adapter);
            assert!(registry.devices().await.is_ok());
        }
    }
}
