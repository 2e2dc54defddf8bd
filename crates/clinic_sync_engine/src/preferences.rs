//! Persisted key/value preferences.
//!
//! The engine keeps two kinds of state outside the record tables: one pull
//! cursor per entity type, and the time the active facility last switched
//! sync group. Both live behind the [`Preferences`] capability.

use crate::error::{SyncError, SyncResult};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// String key/value storage that survives restarts.
pub trait Preferences: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Removes a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> SyncResult<()>;
}

/// Preferences held in memory, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Preferences stored as a single JSON object on disk.
///
/// Every write replaces the whole file through a temporary file and a
/// rename, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Opens the store at `path`, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not a JSON object of strings.
    pub fn open(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let values = match fs::read(path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::Preferences(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Preferences for FilePreferences {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut values = self.values.lock();
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&values) {
            // Keep memory consistent with disk
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let mut values = self.values.lock();
        if let Some(previous) = values.remove(key) {
            if let Err(e) = self.persist(&values) {
                values.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}

/// A typed view of one preference key, stored as JSON text.
pub struct Preference<T> {
    store: Arc<dyn Preferences>,
    key: String,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Preference<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Preference<T> {
    /// Binds a key in `store`.
    pub fn new(store: Arc<dyn Preferences>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _value: PhantomData,
        }
    }

    /// Returns the key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the value, if one has been set.
    pub fn get(&self) -> SyncResult<Option<T>> {
        match self.store.get(&self.key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SyncError::Preferences(format!("{}: {e}", self.key))),
            None => Ok(None),
        }
    }

    /// Writes the value.
    pub fn set(&self, value: &T) -> SyncResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(&self.key, &raw)
    }

    /// Removes the value.
    pub fn delete(&self) -> SyncResult<()> {
        self.store.remove(&self.key)
    }
}

/// Per-entity pull cursor.
pub type PullToken = Preference<String>;

/// When the active facility last moved to a different sync group.
pub type SyncGroupSwitchedAt = Preference<SystemTime>;

/// Key of the facility sync-group switch timestamp.
pub const FACILITY_SYNC_GROUP_SWITCHED_AT: &str = "facility_sync_group_switched_at";
