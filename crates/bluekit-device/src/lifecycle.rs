//! Device lifecycle orchestration.
//!
//! Pair, connect, disconnect, and unpair with verification polling.
//! At most one lifecycle operation runs per device address at a time;
//! a second request for a busy address is rejected immediately, never
//! queued. Operations on different addresses proceed independently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluer::Device;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::adapter::BluetoothAdapter;
use crate::device::Address;
use crate::error::{Error, Result};
use crate::registry::{parse_address, DeviceRegistry};

/// Tunables for lifecycle calls and verification polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on the remote Pair call itself, in seconds. Pairing
    /// may involve several agent round trips, so this is generous.
    pub pair_call_timeout_secs: u64,
    /// Interval between Paired-property polls, in milliseconds.
    pub pair_poll_interval_ms: u64,
    /// Number of Paired-property polls before giving up.
    pub pair_poll_attempts: u32,
    /// Upper bound on the remote Connect call, in seconds.
    pub connect_call_timeout_secs: u64,
    /// Wait after RemoveDevice before re-querying the registry, in
    /// milliseconds.
    pub unpair_settle_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pair_call_timeout_secs: 60,
            pair_poll_interval_ms: 1000,
            pair_poll_attempts: 30,
            connect_call_timeout_secs: 15,
            unpair_settle_ms: 500,
        }
    }
}

/// Keyed in-flight marker enforcing one lifecycle operation per address.
#[derive(Clone, Default)]
pub struct OperationTracker {
    active: Arc<Mutex<HashSet<String>>>,
}

impl OperationTracker {
    /// Claim exclusive access to an address for the lifetime of the
    /// returned guard. Fails if the address is already claimed.
    pub fn claim(&self, address: &Address) -> Result<OperationGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(address.0.clone()) {
            return Err(Error::OperationInFlight(address.clone()));
        }
        Ok(OperationGuard {
            address: address.0.clone(),
            active: Arc::clone(&self.active),
        })
    }
}

/// Releases the claimed address when dropped.
pub struct OperationGuard {
    address: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.address);
    }
}

/// Drives pair/connect/disconnect/unpair transitions for single devices.
pub struct LifecycleController {
    adapter: bluer::Adapter,
    registry: DeviceRegistry,
    ops: OperationTracker,
    config: LifecycleConfig,
}

impl LifecycleController {
    /// Create a controller over the given adapter.
    pub fn new(adapter: &BluetoothAdapter, config: LifecycleConfig) -> Self {
        Self {
            adapter: adapter.adapter().clone(),
            registry: DeviceRegistry::new(adapter),
            ops: OperationTracker::default(),
            config,
        }
    }

    /// Pair with a device. Succeeds trivially if already paired.
    ///
    /// The remote Pair call may re-enter the registered pairing agent any
    /// number of times. Its return does not guarantee the Paired property
    /// has converged, so the property is polled afterwards; exhausting the
    /// poll budget is reported as [`Error::Unconfirmed`], distinct from a
    /// failed call.
    pub async fn pair(&self, address: &Address) -> Result<()> {
        let _guard = self.ops.claim(address)?;
        let device = self.device(address)?;

        if device.is_paired().await.unwrap_or(false) {
            info!("Device {} is already paired", address);
            return Ok(());
        }

        info!("Initiating pairing with {}", address);
        let call = timeout(
            Duration::from_secs(self.config.pair_call_timeout_secs),
            device.pair(),
        )
        .await;
        match call {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::PairingFailed(e.to_string())),
            Err(_) => return Err(Error::Timeout),
        }

        for attempt in 0..self.config.pair_poll_attempts {
            if device.is_paired().await.unwrap_or(false) {
                info!("Successfully paired with {}", address);
                return Ok(());
            }
            debug!(
                "Paired not yet confirmed for {} (attempt {})",
                address,
                attempt + 1
            );
            sleep(Duration::from_millis(self.config.pair_poll_interval_ms)).await;
        }

        warn!("Pairing with {} not confirmed within the poll budget", address);
        Err(Error::Unconfirmed {
            operation: "Pairing",
            address: address.clone(),
        })
    }

    /// Connect to a device. Succeeds trivially if already connected.
    ///
    /// A refused connection is reported, not retried; retry policy belongs
    /// to the caller.
    pub async fn connect(&self, address: &Address) -> Result<()> {
        let _guard = self.ops.claim(address)?;
        let device = self.device(address)?;

        if device.is_connected().await.unwrap_or(false) {
            info!("Device {} is already connected", address);
            return Ok(());
        }

        info!("Connecting to {}", address);
        let call = timeout(
            Duration::from_secs(self.config.connect_call_timeout_secs),
            device.connect(),
        )
        .await;
        match call {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::ConnectionFailed(e.to_string())),
            Err(_) => return Err(Error::Timeout),
        }

        if device.is_connected().await.unwrap_or(false) {
            info!("Connected to {}", address);
            Ok(())
        } else {
            Err(Error::Unconfirmed {
                operation: "Connection",
                address: address.clone(),
            })
        }
    }

    /// Disconnect from a device. Succeeds trivially if not connected.
    pub async fn disconnect(&self, address: &Address) -> Result<()> {
        let _guard = self.ops.claim(address)?;
        let device = self.device(address)?;

        if !device.is_connected().await.unwrap_or(false) {
            debug!("Device {} is already disconnected", address);
            return Ok(());
        }

        info!("Disconnecting from {}", address);
        device
            .disconnect()
            .await
            .map_err(|e| Error::Bus(format!("Failed to disconnect: {}", e)))?;

        if device.is_connected().await.unwrap_or(false) {
            return Err(Error::Unconfirmed {
                operation: "Disconnection",
                address: address.clone(),
            });
        }
        info!("Disconnected from {}", address);
        Ok(())
    }

    /// Remove a device from the adapter. Succeeds trivially if the
    /// adapter does not know the address.
    ///
    /// RemoveDevice can return before removal has propagated, so the
    /// registry is re-queried after a settle period; a device that is
    /// still present is reported as [`Error::Unconfirmed`].
    pub async fn unpair(&self, address: &Address) -> Result<()> {
        let _guard = self.ops.claim(address)?;

        if !self.registry.contains(address).await? {
            debug!("Device {} is not known, nothing to unpair", address);
            return Ok(());
        }

        let addr = parse_address(address)?;
        info!("Removing device {}", address);
        self.adapter
            .remove_device(addr)
            .await
            .map_err(|e| Error::Bus(format!("Failed to remove device: {}", e)))?;

        sleep(Duration::from_millis(self.config.unpair_settle_ms)).await;

        if self.registry.contains(address).await? {
            warn!("Device {} still present after removal", address);
            return Err(Error::Unconfirmed {
                operation: "Removal",
                address: address.clone(),
            });
        }
        info!("Device {} removed", address);
        Ok(())
    }

    /// Mark a device as trusted or untrusted.
    pub async fn set_trusted(&self, address: &Address, trusted: bool) -> Result<()> {
        let device = self.device(address)?;
        device
            .set_trusted(trusted)
            .await
            .map_err(|e| Error::Bus(format!("Failed to set trusted: {}", e)))?;
        debug!(
            "Device {} is now {}",
            address,
            if trusted { "trusted" } else { "untrusted" }
        );
        Ok(())
    }

    /// The registry this controller verifies against.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    fn device(&self, address: &Address) -> Result<Device> {
        let addr = parse_address(address)?;
        self.adapter
            .device(addr)
            .map_err(|e| Error::Bus(format!("Failed to get device {}: {}", address, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    mod operation_tracker {
        use super::*;

        #[test]
        fn second_claim_for_same_address_conflicts() {
            let ops = OperationTracker::default();
            let a = addr("AA:BB:CC:DD:EE:FF");

            let guard = ops.claim(&a).unwrap();
            let second = ops.claim(&a);
            assert!(matches!(second, Err(Error::OperationInFlight(_))));

            drop(guard);
            assert!(ops.claim(&a).is_ok());
        }

        #[test]
        fn claims_for_different_addresses_are_independent() {
            let ops = OperationTracker::default();
            let _a = ops.claim(&addr("AA:BB:CC:DD:EE:01")).unwrap();
            let _b = ops.claim(&addr("AA:BB:CC:DD:EE:02")).unwrap();
            let _c = ops.claim(&addr("AA:BB:CC:DD:EE:03")).unwrap();
        }

        #[test]
        fn guard_releases_on_drop_even_under_clone() {
            let ops = OperationTracker::default();
            let ops2 = ops.clone();
            let a = addr("AA:BB:CC:DD:EE:FF");

            {
                let _guard = ops.claim(&a).unwrap();
                assert!(ops2.claim(&a).is_err());
            }
            assert!(ops2.claim(&a).is_ok());
        }

        #[tokio::test]
        async fn concurrent_claims_never_overlap() {
            let ops = OperationTracker::default();
            let a = addr("AA:BB:CC:DD:EE:FF");

            let mut tasks = Vec::new();
            for _ in 0..16 {
                let ops = ops.clone();
                let a = a.clone();
                tasks.push(tokio::spawn(async move { ops.claim(&a).is_ok() }));
            }

            let mut admitted = 0;
            for task in tasks {
                if task.await.unwrap() {
                    admitted += 1;
                }
            }
            // Guards are dropped inside the tasks, so later tasks may be
            // admitted after earlier ones release; at least one must win
            // and no two may hold the claim at once (checked by claim()).
            assert!(admitted >= 1);
        }
    }

    mod config {
        use super::*;

        #[test]
        fn defaults_match_documented_intervals() {
            let config = LifecycleConfig::default();
            assert_eq!(config.pair_poll_interval_ms, 1000);
            assert_eq!(config.pair_poll_attempts, 30);
            assert_eq!(config.unpair_settle_ms, 500);
        }
    }

    #[tokio::test]
    #[ignore = "requires real Bluetooth hardware"]
    async fn pair_is_idempotent_for_paired_device() {
        // Requires a device that is already paired with this host.
    }
}
