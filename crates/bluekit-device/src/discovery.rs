//! Bluetooth device discovery.
//!
//! Bounded scans and incremental discovery sessions. The daemon reference
//! counts discovery; a [`DiscoverySession`] stops the scan it started when
//! it is dropped.

use std::collections::HashSet;
use std::pin::Pin;
use std::time::Duration;

use bluer::AdapterEvent;
use futures::{Stream, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::adapter::BluetoothAdapter;
use crate::device::{Address, BluetoothDevice};
use crate::error::{Error, Result};
use crate::registry::DeviceRegistry;

/// A device appearing or vanishing during discovery.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A device was added to the adapter's object graph.
    Appeared(Address),
    /// A device was removed from the adapter's object graph.
    Vanished(Address),
}

/// An in-progress discovery. Dropping it stops the scan.
pub struct DiscoverySession {
    events: Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>,
}

impl DiscoverySession {
    /// Wait for the next discovery event. Returns `None` if the daemon
    /// ends the event stream.
    pub async fn next_event(&mut self) -> Option<DiscoveryEvent> {
        loop {
            match self.events.next().await? {
                AdapterEvent::DeviceAdded(addr) => {
                    return Some(DiscoveryEvent::Appeared(Address::from(addr)))
                }
                AdapterEvent::DeviceRemoved(addr) => {
                    return Some(DiscoveryEvent::Vanished(Address::from(addr)))
                }
                _ => continue,
            }
        }
    }
}

/// Device discovery scanner.
pub struct DeviceScanner<'a> {
    adapter: &'a BluetoothAdapter,
}

impl<'a> DeviceScanner<'a> {
    /// Create a scanner for the given adapter.
    pub fn new(adapter: &'a BluetoothAdapter) -> Self {
        Self { adapter }
    }

    /// Start discovery and keep it running until the returned session is
    /// dropped.
    pub async fn start(&self) -> Result<DiscoverySession> {
        if !self.adapter.is_powered().await? {
            return Err(Error::AdapterPoweredOff);
        }

        let events = self
            .adapter
            .adapter()
            .discover_devices()
            .await
            .map_err(|e| Error::Bus(format!("Failed to start discovery: {}", e)))?;

        info!("Discovery started");
        Ok(DiscoverySession {
            events: Box::pin(events),
        })
    }

    /// Scan for the given duration and return every device known
    /// afterwards, previously known devices included.
    pub async fn scan(&self, duration: Duration) -> Result<Vec<BluetoothDevice>> {
        let registry = DeviceRegistry::from_raw(self.adapter.adapter().clone());

        let mut devices = registry.devices().await?;
        let known: HashSet<Address> = devices.iter().map(|d| d.address.clone()).collect();

        info!("Scanning for {:?}", duration);
        let mut session = self.start().await?;

        // The timeout elapsing is the normal end of the scan.
        let _ = timeout(duration, async {
            while let Some(event) = session.next_event().await {
                if let DiscoveryEvent::Appeared(address) = event {
                    if known.contains(&address) {
                        continue;
                    }
                    debug!("Discovered new device: {}", address);
                    match registry.device(&address).await {
                        Ok(device) => devices.push(device),
                        Err(e) => debug!("Could not read {} yet: {}", address, e),
                    }
                }
            }
        })
        .await;

        info!("Scan complete, {} devices known", devices.len());
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires real Bluetooth hardware"]
    async fn scan_finds_devices() {
        if let Ok(adapter) = BluetoothAdapter::new().await {
            let scanner = DeviceScanner::new(&adapter);
            let devices = scanner.scan(Duration::from_secs(5)).await;
            assert!(devices.is_ok());
        }
    }
}
