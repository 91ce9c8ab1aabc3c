//! Error types for agent registration.
//!
//! The agent callbacks themselves answer with [`bluer::agent::ReqResult`],
//! which is the daemon-facing contract; this error type covers the
//! registration surface.

use thiserror::Error;

/// Agent-side error types.
#[derive(Error, Debug)]
pub enum Error {
    /// BlueZ D-Bus error.
    #[error("BlueZ error: {0}")]
    Bus(String),
}

/// Convenience Result type for agent operations.
pub type Result<T> = std::result::Result<T, Error>;
