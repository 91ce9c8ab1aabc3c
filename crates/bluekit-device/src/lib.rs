//! # bluekit-device
//!
//! Bluetooth control plane over BlueZ/D-Bus: adapter management, an
//! on-demand device registry, discovery, and a device lifecycle
//! controller with per-address serialization.
//!
//! Device state observed through the registry is a snapshot, not a live
//! view; callers that need fresh state re-query. Lifecycle operations
//! (pair/connect/disconnect/unpair) are idempotent with respect to an
//! already-satisfied end state and never run concurrently for the same
//! address.

#![cfg(target_os = "linux")]

pub mod adapter;
pub mod device;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod registry;

// Re-exports for convenience
pub use adapter::BluetoothAdapter;
pub use device::{A2dpRole, Address, BluetoothDevice, A2DP_SINK_UUID, A2DP_SOURCE_UUID};
pub use discovery::{DeviceScanner, DiscoveryEvent, DiscoverySession};
pub use error::{Error, Result};
pub use lifecycle::{LifecycleConfig, LifecycleController, OperationGuard, OperationTracker};
pub use registry::DeviceRegistry;
