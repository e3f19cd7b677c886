//! Key-value storage consumed by the feature snapshot cache and the sticky bucket store.
use std::{collections::HashMap, sync::RwLock};

use crate::Result;

/// Storage backend for JSON documents.
///
/// Encryption-at-rest, if any, is the implementation's concern.
pub trait PersistenceLayer: Send + Sync {
    /// Load value stored under `key`. Missing and unreadable values are both `None`.
    fn load(&self, key: &str) -> Option<serde_json::Value>;

    /// Store `value` under `key`, replacing previous value.
    fn save(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Process-local persistence. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        InMemoryPersistence::default()
    }
}

impl PersistenceLayer for InMemoryPersistence {
    fn load(&self, key: &str) -> Option<serde_json::Value> {
        let values = self.values.read().ok()?;
        values.get(key).cloned()
    }

    fn save(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| crate::Error::Persistence("storage lock poisoned".to_owned()))?;
        values.insert(key.to_owned(), value);
        Ok(())
    }
}
