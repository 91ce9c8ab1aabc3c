//! Audio streaming to a connected device.
//!
//! Playback goes through an external player process bound to the
//! device's negotiated audio route; the child's exit status is the only
//! feedback channel. Which direction audio flows is decided by the
//! device's advertised A2DP role (see
//! [`BluetoothDevice::a2dp_role`](bluekit_device::BluetoothDevice::a2dp_role)).

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Starts and stops the external audio player.
///
/// At most one stream is active at a time; starting a new one first
/// tears down the previous player.
pub struct AudioStreamer {
    command: String,
    child: Option<Child>,
}

impl AudioStreamer {
    /// Create a streamer that plays through the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: None,
        }
    }

    /// Start streaming the given file. Any previous stream is stopped
    /// first.
    pub async fn start(&mut self, file: &Path) -> Result<()> {
        if !file.exists() {
            return Err(Error::FileNotFound(file.to_path_buf()));
        }

        if self.stop().await? {
            debug!("Stopped previous stream before starting a new one");
        }

        let child = Command::new(&self.command)
            .arg(file)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Process {
                command: self.command.clone(),
                message: e.to_string(),
            })?;

        info!("Streaming {} via {}", file.display(), self.command);
        self.child = Some(child);
        Ok(())
    }

    /// Stop the current stream. Returns whether a stream was active.
    /// Stopping with nothing playing is a no-op.
    pub async fn stop(&mut self) -> Result<bool> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => {
                debug!("No active stream to stop");
                return Ok(false);
            }
        };

        match child.try_wait() {
            Ok(Some(status)) => debug!("Player had already exited: {}", status),
            _ => {
                child.kill().await.map_err(|e| Error::Process {
                    command: self.command.clone(),
                    message: e.to_string(),
                })?;
                info!("Stream stopped");
            }
        }
        Ok(true)
    }

    /// Whether the player process is still running.
    pub fn is_streaming(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        if let Some(child) = &mut self.child {
            if let Err(e) = child.start_kill() {
                warn!("Failed to stop player on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FILE_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn scratch_file() -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "bluekit-audio-test-{}-{}.wav",
            std::process::id(),
            FILE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, b"not really audio").unwrap();
        path
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let mut streamer = AudioStreamer::new("cat");
        assert!(!streamer.stop().await.unwrap());
    }

    #[tokio::test]
    async fn start_rejects_missing_file() {
        let mut streamer = AudioStreamer::new("cat");
        let result = streamer.start(Path::new("/nonexistent/audio.wav")).await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn start_then_stop_reports_an_active_stream() {
        let file = scratch_file();
        // `cat` consumes the file and exits; stop must handle both a
        // still-running and an already-exited player.
        let mut streamer = AudioStreamer::new("cat");
        streamer.start(&file).await.unwrap();
        assert!(streamer.stop().await.unwrap());
        assert!(!streamer.is_streaming());
    }

    #[tokio::test]
    async fn missing_player_is_a_process_error() {
        let file = scratch_file();
        let mut streamer = AudioStreamer::new("/nonexistent/bluekit-player");
        let result = streamer.start(&file).await;
        assert!(matches!(result, Err(Error::Process { .. })));
    }

    #[tokio::test]
    async fn restart_replaces_the_previous_stream() {
        let file = scratch_file();
        let mut streamer = AudioStreamer::new("cat");
        streamer.start(&file).await.unwrap();
        streamer.start(&file).await.unwrap();
        assert!(streamer.stop().await.unwrap());
        assert!(!streamer.stop().await.unwrap());
    }
}
