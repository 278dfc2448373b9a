//! State carried between component instances
//!
//! `wasmtime serve` instantiates the component afresh for every request, so
//! the binary loads a [`StateSnapshot`] before handling each request and saves
//! it afterwards. The file is scratch space for the running relay; start each
//! run with it removed.

use crate::error::SnapshotError;
use crate::rooms::RoomStore;
use glimpse_protocol::UserId;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A connected user's mailbox contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_id: UserId,
    pub events: Vec<String>,
    pub last_seen_ms: u64,
}

/// Everything the relay knows
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub sessions: Vec<SessionSnapshot>,
    pub rooms: RoomStore,
}

/// JSON file holding the latest snapshot
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot; `None` if no file has been written yet
    pub fn load(&self) -> Result<Option<StateSnapshot>, SnapshotError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Like [`StateFile::load`], starting empty when the file is missing or
    /// unreadable
    pub fn load_or_default(&self) -> StateSnapshot {
        match self.load() {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "discarding unreadable state file");
                StateSnapshot::default()
            }
        }
    }

    /// Write the snapshot through a temporary file so readers never see a
    /// partial document
    pub fn save(&self, snapshot: &StateSnapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_string(snapshot)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let staging = PathBuf::from(staging);
        std::fs::write(&staging, json)?;
        if let Err(error) = std::fs::rename(&staging, &self.path) {
            let _ = std::fs::remove_file(&staging);
            return Err(error.into());
        }
        Ok(())
    }
}
