//! Transfer-session configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for object-push and audio sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Directory where inbound object-push files land.
    pub holding_dir: PathBuf,
    /// Command spawned as the object-push receiver.
    pub receiver_command: String,
    /// Command spawned to play audio to the connected device.
    pub player_command: String,
    /// Milliseconds to wait for an inbound file.
    pub receive_timeout_ms: u64,
    /// Milliseconds between holding-directory polls.
    pub receive_poll_ms: u64,
    /// Milliseconds to wait for a send transfer to reach a terminal
    /// status.
    pub send_timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            holding_dir: PathBuf::from("/tmp/bluetooth-inbox"),
            receiver_command: "obexpushd".to_string(),
            player_command: "paplay".to_string(),
            receive_timeout_ms: 20_000,
            receive_poll_ms: 500,
            send_timeout_ms: 120_000,
        }
    }
}

impl TransferConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    pub(crate) fn receive_deadline(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub(crate) fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    pub(crate) fn send_deadline(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = TransferConfig::default();
        assert_eq!(config.receiver_command, "obexpushd");
        assert_eq!(config.player_command, "paplay");
        assert_eq!(config.receive_poll_ms, 500);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: TransferConfig =
            toml::from_str("holding_dir = \"/var/spool/bt\"\nreceive_timeout_ms = 5000\n")
                .unwrap();
        assert_eq!(config.holding_dir, PathBuf::from("/var/spool/bt"));
        assert_eq!(config.receive_timeout_ms, 5_000);
        assert_eq!(config.receiver_command, "obexpushd");
    }
}
