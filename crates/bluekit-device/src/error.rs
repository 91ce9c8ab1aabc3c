//! Error types for adapter, registry, and lifecycle operations.

use thiserror::Error;

use crate::device::Address;

/// Device-plane error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth adapter not found.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Adapter is powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// Device is not known to the adapter.
    #[error("Bluetooth device not found: {0}")]
    DeviceNotFound(Address),

    /// Address string is not a valid Bluetooth address.
    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    /// Another lifecycle operation is already running for this address.
    ///
    /// The caller must retry once the current operation finishes; requests
    /// are never queued.
    #[error("Operation already in flight for {0}")]
    OperationInFlight(Address),

    /// Pairing failed.
    #[error("Pairing failed: {0}")]
    PairingFailed(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote call was accepted but the expected property never
    /// converged within the polling budget. The operation may still
    /// complete later.
    #[error("{operation} of {address} was accepted but never confirmed")]
    Unconfirmed {
        operation: &'static str,
        address: Address,
    },

    /// BlueZ D-Bus error.
    #[error("BlueZ error: {0}")]
    Bus(String),

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for device-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = Error::DeviceNotFound(Address::new("AA:BB:CC:DD:EE:FF"));
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::Unconfirmed {
            operation: "Removal",
            address: Address::new("AA:BB:CC:DD:EE:FF"),
        };
        assert!(err.to_string().contains("never confirmed"));

        let err = Error::OperationInFlight(Address::new("AA:BB:CC:DD:EE:FF"));
        assert!(err.to_string().contains("in flight"));
    }
}
