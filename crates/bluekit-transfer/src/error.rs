//! Error types for transfer and media sessions.

use std::path::PathBuf;

use thiserror::Error;

use bluekit_device::Address;

/// Transfer-plane error types.
#[derive(Error, Debug)]
pub enum Error {
    /// D-Bus error from obexd or BlueZ.
    #[error("D-Bus error: {0}")]
    Bus(String),

    /// Local file to send does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The receive deadline elapsed with no inbound file.
    #[error("No file received before the deadline")]
    NoFileReceived,

    /// The transfer started but never reached a terminal status within
    /// the deadline. It may still finish later on the daemon side.
    #[error("Transfer did not reach a terminal status before the deadline")]
    StatusTimeout,

    /// The device exposes no media control interface.
    #[error("No media control interface for {0}")]
    MediaControlUnavailable(Address),

    /// An external helper process could not be run.
    #[error("Failed to run {command}: {message}")]
    Process { command: String, message: String },

    /// Configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = Error::MediaControlUnavailable(Address::new("AA:BB:CC:DD:EE:FF"));
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::Process {
            command: "obexpushd".to_string(),
            message: "not found".to_string(),
        };
        assert!(err.to_string().contains("obexpushd"));
    }
}
