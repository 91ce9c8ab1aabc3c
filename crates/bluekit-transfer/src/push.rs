//! Object-push send and receive.
//!
//! Send goes through obexd: create a session, start the transfer, wait
//! for its terminal status, and tear the session down whatever happened.
//! Receive runs an external object-push receiver bound to a holding
//! directory and watches the directory for the inbound file; there is no
//! transfer-object correlation on the receive side.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use bluekit_device::Address;

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::obex::{ObexClient, TransferStatus};

/// Decides whether an inbound file is kept.
///
/// Implementations typically forward to a user prompt; tests mock this.
#[cfg_attr(test, mockall::automock)]
pub trait FileAcceptor: Send + Sync {
    fn accept(&self, file: &Path) -> bool;
}

/// How a receive resolved when a file did arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// File accepted and kept in the holding directory.
    Accepted(PathBuf),
    /// File rejected by the acceptor; it has been deleted.
    Rejected(PathBuf),
}

/// Object-push controller for one holding directory.
pub struct PushController {
    obex: OnceCell<ObexClient>,
    config: TransferConfig,
}

impl PushController {
    /// Create a controller. The session-bus connection is established on
    /// first use, so receiving works on systems without obexd running.
    pub fn new(config: TransferConfig) -> Self {
        Self {
            obex: OnceCell::new(),
            config,
        }
    }

    /// Send a file to the device and wait for the transfer to finish.
    ///
    /// The obexd session is removed afterwards regardless of how the
    /// transfer ended; a failed teardown is logged but does not mask the
    /// transfer outcome.
    pub async fn send_file(&self, address: &Address, file: &Path) -> Result<TransferStatus> {
        if !file.exists() {
            return Err(Error::FileNotFound(file.to_path_buf()));
        }

        let obex = self.obex().await?;
        let session = obex.create_session(address).await?;
        let outcome = async {
            let transfer = obex.send_file(&session, file).await?;
            obex.await_transfer(&transfer, self.config.send_deadline())
                .await
        }
        .await;

        if let Err(e) = obex.remove_session(address).await {
            warn!("Failed to remove OBEX session for {}: {}", address, e);
        }

        if let Ok(status) = &outcome {
            info!("Transfer to {} ended: {:?}", address, status);
        }
        outcome
    }

    async fn obex(&self) -> Result<&ObexClient> {
        self.obex.get_or_try_init(|| async { ObexClient::new() }).await
    }

    /// Wait for one inbound file in the holding directory.
    ///
    /// Starts the receiver process, polls the directory's file set until
    /// the deadline, and stops the receiver on every exit path. A file
    /// that arrives is submitted to the acceptor (when given); rejected
    /// files are deleted. Note that any concurrent writer to the holding
    /// directory is indistinguishable from an inbound transfer.
    pub async fn receive_file(
        &self,
        acceptor: Option<&dyn FileAcceptor>,
    ) -> Result<ReceiveOutcome> {
        let dir = &self.config.holding_dir;
        tokio::fs::create_dir_all(dir).await?;

        let existing = list_files(dir).await?;
        let mut receiver = Receiver::spawn(&self.config.receiver_command, dir)?;
        info!("Object-push receiver started, waiting for a file");

        let arrival = next_new_file(
            dir,
            &existing,
            self.config.receive_deadline(),
            self.config.receive_poll(),
        )
        .await;

        receiver.stop().await;

        let file = arrival?.ok_or(Error::NoFileReceived)?;
        info!("Inbound file: {}", file.display());

        let accepted = acceptor.map(|a| a.accept(&file)).unwrap_or(true);
        if accepted {
            Ok(ReceiveOutcome::Accepted(file))
        } else {
            info!("Inbound file rejected, deleting {}", file.display());
            tokio::fs::remove_file(&file).await?;
            Ok(ReceiveOutcome::Rejected(file))
        }
    }
}

/// Poll `dir` until an entry not in `existing` appears or the deadline
/// elapses. Returns `None` on deadline.
async fn next_new_file(
    dir: &Path,
    existing: &HashSet<OsString>,
    deadline: Duration,
    poll: Duration,
) -> Result<Option<PathBuf>> {
    let give_up = tokio::time::Instant::now() + deadline;
    loop {
        let current = list_files(dir).await?;
        if let Some(name) = current.difference(existing).next() {
            return Ok(Some(dir.join(name)));
        }
        if tokio::time::Instant::now() >= give_up {
            return Ok(None);
        }
        tokio::time::sleep(poll).await;
    }
}

async fn list_files(dir: &Path) -> Result<HashSet<OsString>> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.insert(entry.file_name());
    }
    Ok(names)
}

/// Handle to the external object-push receiver process.
struct Receiver {
    command: String,
    child: Child,
}

impl Receiver {
    /// Spawn the receiver bound to the holding directory, without
    /// prompting (obexpushd-compatible flags).
    fn spawn(command: &str, dir: &Path) -> Result<Self> {
        let child = Command::new(command)
            .arg("-B")
            .arg("-o")
            .arg(dir)
            .arg("-n")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Process {
                command: command.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            command: command.to_string(),
            child,
        })
    }

    /// Terminate the receiver and reap it. Safe to call when the process
    /// has already exited.
    async fn stop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!("Receiver {} had already exited: {}", self.command, status),
            _ => {
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to stop receiver {}: {}", self.command, e);
                } else {
                    debug!("Receiver {} stopped", self.command);
                }
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        // Best effort if stop() was never reached.
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bluekit-push-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn quick_config(dir: &Path) -> TransferConfig {
        TransferConfig {
            holding_dir: dir.to_path_buf(),
            // `true` ignores its arguments and exits immediately, which
            // stands in for a receiver the tests cannot run.
            receiver_command: "true".to_string(),
            receive_timeout_ms: 300,
            receive_poll_ms: 20,
            ..TransferConfig::default()
        }
    }

    mod polling {
        use super::*;

        #[tokio::test]
        async fn empty_directory_times_out() {
            let dir = scratch_dir();
            let existing = list_files(&dir).await.unwrap();

            let found = next_new_file(
                &dir,
                &existing,
                Duration::from_millis(150),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
            assert_eq!(found, None);
        }

        #[tokio::test]
        async fn preexisting_files_are_not_reported() {
            let dir = scratch_dir();
            std::fs::write(dir.join("already-there.txt"), b"old").unwrap();
            let existing = list_files(&dir).await.unwrap();

            let found = next_new_file(
                &dir,
                &existing,
                Duration::from_millis(150),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
            assert_eq!(found, None);
        }

        #[tokio::test]
        async fn new_file_is_detected() {
            let dir = scratch_dir();
            std::fs::write(dir.join("old.txt"), b"old").unwrap();
            let existing = list_files(&dir).await.unwrap();

            let writer = {
                let dir = dir.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    tokio::fs::write(dir.join("incoming.jpg"), b"data").await.unwrap();
                })
            };

            let found = next_new_file(
                &dir,
                &existing,
                Duration::from_secs(5),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
            assert_eq!(found, Some(dir.join("incoming.jpg")));
            writer.await.unwrap();
        }
    }

    mod receiver_process {
        use super::*;

        #[tokio::test]
        async fn stop_reaps_an_exited_receiver() {
            let dir = scratch_dir();
            let mut receiver = Receiver::spawn("true", &dir).unwrap();
            // Give `true` a moment to exit, then stop must not error.
            tokio::time::sleep(Duration::from_millis(50)).await;
            receiver.stop().await;
        }

        #[test]
        fn missing_command_is_a_process_error() {
            let dir = scratch_dir();
            let result = Receiver::spawn("/nonexistent/bluekit-receiver", &dir);
            assert!(matches!(result, Err(Error::Process { .. })));
        }
    }

    mod receive {
        use super::*;

        #[tokio::test]
        async fn empty_holding_dir_reports_no_file() {
            let dir = scratch_dir();
            let controller = PushController::new(quick_config(&dir));

            let result = controller.receive_file(None).await;
            assert!(matches!(result, Err(Error::NoFileReceived)));
        }

        #[tokio::test]
        async fn accepted_file_is_kept() {
            let dir = scratch_dir();
            let controller = PushController::new(quick_config(&dir));

            let writer = {
                let dir = dir.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    tokio::fs::write(dir.join("photo.jpg"), b"data").await.unwrap();
                })
            };

            let mut acceptor = MockFileAcceptor::new();
            acceptor.expect_accept().return_const(true);

            let outcome = controller.receive_file(Some(&acceptor)).await.unwrap();
            assert_eq!(outcome, ReceiveOutcome::Accepted(dir.join("photo.jpg")));
            assert!(dir.join("photo.jpg").exists());
            writer.await.unwrap();
        }

        #[tokio::test]
        async fn rejected_file_is_deleted() {
            let dir = scratch_dir();
            let controller = PushController::new(quick_config(&dir));

            let writer = {
                let dir = dir.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    tokio::fs::write(dir.join("unwanted.bin"), b"data").await.unwrap();
                })
            };

            let mut acceptor = MockFileAcceptor::new();
            acceptor.expect_accept().return_const(false);

            let outcome = controller.receive_file(Some(&acceptor)).await.unwrap();
            assert_eq!(outcome, ReceiveOutcome::Rejected(dir.join("unwanted.bin")));
            assert!(!dir.join("unwanted.bin").exists());
            writer.await.unwrap();
        }

        #[tokio::test]
        async fn missing_receiver_fails_before_polling() {
            let dir = scratch_dir();
            let mut config = quick_config(&dir);
            config.receiver_command = "/nonexistent/bluekit-receiver".to_string();
            let controller = PushController::new(config);

            let result = controller.receive_file(None).await;
            assert!(matches!(result, Err(Error::Process { .. })));
        }
    }
}
