//! Durable key-value persistence for catalog state.
//!
//! One JSON document per key, stored as a file under the data directory.
//! Writes go through a temp file and rename so a crash mid-write never
//! leaves a torn document behind.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde_json::Value;

/// File-backed key-value store for JSON documents.
#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory this store persists into.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load a record. Absent and unreadable records both read as `None`.
    pub fn load(&self, key: &str) -> Option<Value> {
        let bytes = fs::read(self.path_for(key)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable record");
                None
            }
        }
    }

    /// Durably save a record, replacing any prior content.
    pub fn save(&self, key: &str, value: &Value) -> io::Result<()> {
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, self.path_for(key))
    }

    /// Remove a record. Removing an absent key is not an error.
    pub fn clear(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
