//! Account datastore.
//!
//! A flat key → JSON document map persisted to one file. The server only
//! ever reads `account.<name>` records; writes happen out of band (account
//! registration tooling), so the store optimizes for cheap reads and a
//! periodic background save plus a flush on shutdown.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("datastore format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stored credentials for an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub passphrase: Option<String>,
}

/// One `account.<name>` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub verified: bool,
}

/// The JSON-backed key/value store.
pub struct DataStore {
    path: Option<PathBuf>,
    map: Mutex<HashMap<String, serde_json::Value>>,
}

impl DataStore {
    /// Load the store from `path`, creating an empty one when absent.
    pub fn create_or_load(path: &str) -> Result<DataStore, StoreError> {
        let path = PathBuf::from(path);
        let map = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            info!(path = %path.display(), "creating new datastore");
            HashMap::new()
        };
        Ok(DataStore {
            path: Some(path),
            map: Mutex::new(map),
        })
    }

    /// An unbacked store; saves are no-ops. Used by tests.
    pub fn in_memory() -> DataStore {
        DataStore {
            path: None,
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a raw document.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.map.lock().get(key).cloned()
    }

    /// Store a raw document.
    pub fn put(&self, key: &str, value: serde_json::Value) {
        self.map.lock().insert(key.to_string(), value);
    }

    /// Fetch and decode an `account.<name>` record.
    pub fn get_account(&self, name: &str) -> Option<AccountRecord> {
        let value = self.get(&format!("account.{name}"))?;
        serde_json::from_value(value).ok()
    }

    /// Write the store back to disk (no-op for in-memory stores).
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(&*self.map.lock())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_records_decode() {
        let store = DataStore::in_memory();
        store.put(
            "account.bob",
            json!({
                "credentials": { "passphrase": "$argon2id$..." },
                "verified": true,
            }),
        );

        let record = store.get_account("bob").unwrap();
        assert!(record.verified);
        assert_eq!(record.credentials.passphrase.as_deref(), Some("$argon2id$..."));
        assert!(store.get_account("alice").is_none());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let path_str = path.to_str().unwrap();

        let store = DataStore::create_or_load(path_str).unwrap();
        store.put("account.bob", json!({ "verified": false }));
        store.save().unwrap();

        let reloaded = DataStore::create_or_load(path_str).unwrap();
        let record = reloaded.get_account("bob").unwrap();
        assert!(!record.verified);
        assert!(record.credentials.passphrase.is_none());
    }
}
