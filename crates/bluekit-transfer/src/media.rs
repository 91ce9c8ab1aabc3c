//! AVRCP remote control.
//!
//! Dispatches media commands through the device's
//! `org.bluez.MediaControl1` interface, located by walking the daemon's
//! managed-object graph. A device without that interface is reported,
//! not retried.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dbus::arg::PropMap;
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::Path;
use dbus_tokio::connection;
use tracing::{debug, info, warn};

use bluekit_device::Address;

use crate::error::{Error, Result};

const BLUEZ_SERVICE: &str = "org.bluez";
const MEDIA_CONTROL_IFACE: &str = "org.bluez.MediaControl1";
const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

type ManagedObjects = HashMap<Path<'static>, HashMap<String, PropMap>>;

/// A media control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    Play,
    Pause,
    Next,
    Previous,
    Rewind,
}

impl MediaCommand {
    /// The daemon-side method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Play => "Play",
            Self::Pause => "Pause",
            Self::Next => "Next",
            Self::Previous => "Previous",
            Self::Rewind => "Rewind",
        }
    }
}

impl FromStr for MediaCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "next" => Ok(Self::Next),
            "previous" => Ok(Self::Previous),
            "rewind" => Ok(Self::Rewind),
            other => Err(Error::Config(format!("Unknown media command: {}", other))),
        }
    }
}

/// Dispatches AVRCP commands to connected devices.
pub struct MediaController {
    conn: Arc<SyncConnection>,
}

impl MediaController {
    /// Connect to the system bus. Must be called from within a Tokio
    /// runtime.
    pub fn new() -> Result<Self> {
        let (resource, conn) =
            connection::new_system_sync().map_err(|e| Error::Bus(e.to_string()))?;

        tokio::spawn(async move {
            let err = resource.await;
            warn!("Lost system bus connection: {}", err);
        });

        Ok(Self { conn })
    }

    /// Send one command to the device's media control interface.
    pub async fn send(&self, address: &Address, command: MediaCommand) -> Result<()> {
        let path = self
            .control_path(address)
            .await?
            .ok_or_else(|| Error::MediaControlUnavailable(address.clone()))?;

        let proxy = Proxy::new(BLUEZ_SERVICE, path.clone(), CALL_TIMEOUT, self.conn.clone());
        proxy
            .method_call::<(), _, _, _>(MEDIA_CONTROL_IFACE, command.method(), ())
            .await
            .map_err(|e| Error::Bus(format!("{} failed for {}: {}", command.method(), address, e)))?;

        info!("Sent {:?} to {}", command, address);
        Ok(())
    }

    /// Find the device's MediaControl1 object path, if it has one.
    async fn control_path(&self, address: &Address) -> Result<Option<Path<'static>>> {
        let proxy = Proxy::new(BLUEZ_SERVICE, "/", CALL_TIMEOUT, self.conn.clone());
        let (objects,): (ManagedObjects,) = proxy
            .method_call(OBJECT_MANAGER_IFACE, "GetManagedObjects", ())
            .await
            .map_err(|e| Error::Bus(format!("GetManagedObjects failed: {}", e)))?;

        let needle = address.to_path_component();
        for (path, interfaces) in objects {
            if interfaces.contains_key(MEDIA_CONTROL_IFACE) && path.contains(&needle) {
                debug!("Found media control at {}", path);
                return Ok(Some(path));
            }
        }
        debug!("No media control interface for {}", address);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_methods_match_daemon_names() {
        assert_eq!(MediaCommand::Play.method(), "Play");
        assert_eq!(MediaCommand::Pause.method(), "Pause");
        assert_eq!(MediaCommand::Next.method(), "Next");
        assert_eq!(MediaCommand::Previous.method(), "Previous");
        assert_eq!(MediaCommand::Rewind.method(), "Rewind");
    }

    #[test]
    fn commands_parse_from_lowercase_names() {
        assert_eq!("play".parse::<MediaCommand>().unwrap(), MediaCommand::Play);
        assert_eq!(
            "previous".parse::<MediaCommand>().unwrap(),
            MediaCommand::Previous
        );
        assert!("stop".parse::<MediaCommand>().is_err());
    }

    #[tokio::test]
    #[ignore = "requires real Bluetooth hardware"]
    async fn absent_interface_is_reported() {
        let controller = MediaController::new().unwrap();
        let result = controller
            .send(&Address::new("00:00:00:00:00:00"), MediaCommand::Play)
            .await;
        assert!(matches!(result, Err(Error::MediaControlUnavailable(_))));
    }
}
