//! Bluetooth adapter management.
//!
//! Thin wrapper over the BlueZ adapter object for power, visibility, and
//! identity control.

use bluer::{Adapter, Session};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Wrapper around one Bluetooth adapter.
pub struct BluetoothAdapter {
    session: Session,
    adapter: Adapter,
}

impl BluetoothAdapter {
    /// Create an adapter manager using the system's default adapter.
    pub async fn new() -> Result<Self> {
        let session = Session::new()
            .await
            .map_err(|e| Error::Bus(format!("Failed to create BlueZ session: {}", e)))?;

        let adapter = session.default_adapter().await.map_err(|e| {
            if e.to_string().contains("No default adapter") {
                Error::AdapterNotFound
            } else {
                Error::Bus(format!("Failed to get adapter: {}", e))
            }
        })?;

        info!("Using Bluetooth adapter: {}", adapter.name());
        Ok(Self { session, adapter })
    }

    /// Create an adapter manager for a specific interface (e.g., "hci0").
    pub async fn with_name(name: &str) -> Result<Self> {
        let session = Session::new()
            .await
            .map_err(|e| Error::Bus(format!("Failed to create BlueZ session: {}", e)))?;

        let adapter = session.adapter(name).map_err(|_| Error::AdapterNotFound)?;

        info!("Using Bluetooth adapter: {}", adapter.name());
        Ok(Self { session, adapter })
    }

    /// Get the adapter name (e.g., "hci0").
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Get the adapter's Bluetooth address.
    pub async fn address(&self) -> Result<String> {
        let addr = self
            .adapter
            .address()
            .await
            .map_err(|e| Error::Bus(format!("Failed to get adapter address: {}", e)))?;
        Ok(addr.to_string())
    }

    /// Check if the adapter is powered on.
    pub async fn is_powered(&self) -> Result<bool> {
        self.adapter
            .is_powered()
            .await
            .map_err(|e| Error::Bus(format!("Failed to get power state: {}", e)))
    }

    /// Power the adapter on or off.
    pub async fn set_powered(&self, powered: bool) -> Result<()> {
        self.adapter
            .set_powered(powered)
            .await
            .map_err(|e| Error::Bus(format!("Failed to set power state: {}", e)))?;
        info!(
            "Bluetooth adapter powered {}",
            if powered { "on" } else { "off" }
        );
        Ok(())
    }

    /// Set whether the adapter is visible to scanning devices.
    pub async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        self.adapter
            .set_discoverable(discoverable)
            .await
            .map_err(|e| Error::Bus(format!("Failed to set discoverable state: {}", e)))?;
        debug!(
            "Adapter is now {}",
            if discoverable {
                "discoverable"
            } else {
                "hidden"
            }
        );
        Ok(())
    }

    /// Set the discoverable timeout in seconds (0 = no timeout).
    pub async fn set_discoverable_timeout(&self, timeout: u32) -> Result<()> {
        self.adapter
            .set_discoverable_timeout(timeout)
            .await
            .map_err(|e| Error::Bus(format!("Failed to set discoverable timeout: {}", e)))?;
        debug!("Set discoverable timeout to {} seconds", timeout);
        Ok(())
    }

    /// Set whether the adapter accepts pairing requests.
    pub async fn set_pairable(&self, pairable: bool) -> Result<()> {
        self.adapter
            .set_pairable(pairable)
            .await
            .map_err(|e| Error::Bus(format!("Failed to set pairable state: {}", e)))?;
        debug!(
            "Adapter is now {}",
            if pairable { "pairable" } else { "unpairable" }
        );
        Ok(())
    }

    /// Get the adapter's alias (friendly name).
    pub async fn alias(&self) -> Result<String> {
        self.adapter
            .alias()
            .await
            .map_err(|e| Error::Bus(format!("Failed to get adapter alias: {}", e)))
    }

    /// Set the adapter's alias (friendly name).
    pub async fn set_alias(&self, alias: &str) -> Result<()> {
        self.adapter
            .set_alias(alias.to_string())
            .await
            .map_err(|e| Error::Bus(format!("Failed to set adapter alias: {}", e)))?;
        info!("Set adapter alias to: {}", alias);
        Ok(())
    }

    /// Make the adapter visible and ready to pair.
    ///
    /// Powers the adapter on and enables discoverable (without timeout)
    /// and pairable modes.
    pub async fn make_visible(&self) -> Result<()> {
        if !self.is_powered().await? {
            self.set_powered(true).await?;
        }
        self.set_discoverable_timeout(0).await?;
        self.set_discoverable(true).await?;
        self.set_pairable(true).await?;
        info!("Adapter is now visible and pairable");
        Ok(())
    }

    /// Get a reference to the underlying bluer session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get a reference to the underlying bluer adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}
