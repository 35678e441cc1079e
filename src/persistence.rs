//! Persisted network state and the bundled state stores
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::certificate::MembershipCertificate;
use crate::error::Result;
use crate::network::{NetworkConfig, NetworkId, StateStore};
use crate::persistence_error;

/// Everything a network writes to stable storage
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PersistedState {
    #[serde(default)]
    pub config: Option<NetworkConfig>,
    #[serde(default)]
    pub certificates: Vec<MembershipCertificate>,
}

impl PersistedState {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// One JSON file per network: `<dir>/<network id>.json`
#[derive(Clone, Debug)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, network_id: NetworkId) -> PathBuf {
        self.dir.join(format!("{}.json", network_id))
    }
}

impl StateStore for FileStateStore {
    fn save(&self, network_id: NetworkId, state: &[u8]) -> Result<()> {
        let path = self.path_for(network_id);
        // write-then-rename so a crash never leaves a truncated file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, state)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved state for network {} to {}", network_id, path.display());
        Ok(())
    }

    fn load(&self, network_id: NetworkId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(network_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn erase(&self, network_id: NetworkId) -> Result<()> {
        match fs::remove_file(self.path_for(network_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence_error!(
                "Unable to erase state for network {}: {}",
                network_id,
                e
            )),
        }
    }
}

/// In-memory store for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    blobs: Mutex<HashMap<NetworkId, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, network_id: NetworkId) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&network_id)
    }

    /// Decode the stored blob for `network_id`, if any
    pub fn state(&self, network_id: NetworkId) -> Result<Option<PersistedState>> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs
            .get(&network_id)
            .map(|bytes| PersistedState::from_bytes(bytes))
            .transpose()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, network_id: NetworkId, state: &[u8]) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(network_id, state.to_vec());
        Ok(())
    }

    fn load(&self, network_id: NetworkId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&network_id)
            .cloned())
    }

    fn erase(&self, network_id: NetworkId) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&network_id);
        Ok(())
    }
}
