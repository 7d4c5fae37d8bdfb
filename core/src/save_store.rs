//! Battle persistence
//!
//! The host persists the connection state and a full checkpoint whenever it
//! pauses or resumes, so a crashed or reloaded host can pick the battle back
//! up. Stores are injected into the host session through [`CheckpointStore`].

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use battlelink_shared::BattleCheckpoint;
use serde::{Deserialize, Serialize};

use crate::net::battle::ConnectionState;

/// File name used inside the data directory
pub const SAVE_FILE_NAME: &str = "battle.json";

/// What gets persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedBattle {
    pub connection: ConnectionState,
    pub checkpoint: BattleCheckpoint,
    /// Wall clock (ms since epoch) at save time
    pub saved_at: i64,
}

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode battle: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Saved battle is corrupt: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Where persisted battles live.
pub trait CheckpointStore {
    fn persist(&mut self, battle: &PersistedBattle) -> Result<(), StoreError>;

    /// The last persisted battle, if any.
    fn load(&self) -> Result<Option<PersistedBattle>, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    slot: Rc<RefCell<Option<PersistedBattle>>>,
    saves: Rc<RefCell<usize>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `persist` calls.
    pub fn saves(&self) -> usize {
        *self.saves.borrow()
    }

    /// Copy of the stored battle.
    pub fn latest(&self) -> Option<PersistedBattle> {
        self.slot.borrow().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn persist(&mut self, battle: &PersistedBattle) -> Result<(), StoreError> {
        *self.slot.borrow_mut() = Some(battle.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedBattle>, StoreError> {
        Ok(self.latest())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        *self.slot.borrow_mut() = None;
        Ok(())
    }
}

/// JSON file store with atomic replace.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store in the platform data directory.
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn default_path() -> Option<PathBuf> {
        crate::config::data_dir().map(|dir| dir.join(SAVE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> io::Result<PathBuf> {
        match self.path.file_name() {
            Some(name) => {
                let mut tmp_name = OsString::from(name);
                tmp_name.push(".tmp");
                Ok(self.path.with_file_name(tmp_name))
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "store path has no file name",
            )),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn persist(&mut self, battle: &PersistedBattle) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(battle).map_err(StoreError::Encode)?;
        let tmp_path = self.tmp_path()?;

        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }

        #[cfg(windows)]
        {
            if self.path.exists() {
                // Windows rename fails if destination exists.
                fs::remove_file(&self.path)?;
            }
        }

        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), "Battle persisted");
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedBattle>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(StoreError::Decode)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
