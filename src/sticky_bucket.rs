//! Persisted experiment assignments that keep users in their variation even after experiment
//! weights change.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

use crate::{persistence::PersistenceLayer, Error, Result};

/// Prefix of persistence keys used for sticky bucket documents.
pub const STICKY_BUCKET_KEY_PREFIX: &str = "gbStickyBuckets__";

/// Assignments of a single attribute identity, e.g. `id = "user-123"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyAssignmentsDocument {
    pub attribute_name: String,
    pub attribute_value: String,
    /// Maps `"{experimentKey}__{bucketVersion}"` to variation key.
    #[serde(default)]
    pub assignments: HashMap<String, String>,
}

impl StickyAssignmentsDocument {
    pub fn new(attribute_name: impl Into<String>, attribute_value: impl Into<String>) -> Self {
        StickyAssignmentsDocument {
            attribute_name: attribute_name.into(),
            attribute_value: attribute_value.into(),
            assignments: HashMap::new(),
        }
    }

    /// Identity key of the document, `"{attributeName}||{attributeValue}"`.
    pub fn key(&self) -> String {
        document_key(&self.attribute_name, &self.attribute_value)
    }
}

pub(crate) fn document_key(attribute_name: &str, attribute_value: &str) -> String {
    format!("{attribute_name}||{attribute_value}")
}

/// Key of an experiment inside [`StickyAssignmentsDocument::assignments`].
pub fn experiment_key(experiment_key: &str, bucket_version: u32) -> String {
    format!("{experiment_key}__{bucket_version}")
}

/// Store of sticky assignment documents.
///
/// Implementations must be safe to call from concurrent evaluations. A document that cannot be
/// read must be reported as absent.
pub trait StickyBucketService: Send + Sync {
    fn get_assignments(
        &self,
        attribute_name: &str,
        attribute_value: &str,
    ) -> Option<StickyAssignmentsDocument>;

    /// Persist assignments of `doc`. Assignments stored earlier for other experiments are kept.
    fn save_assignments(&self, doc: &StickyAssignmentsDocument) -> Result<()>;

    /// Look up documents of every `(name, value)` pair in `attributes`, keyed by
    /// [`StickyAssignmentsDocument::key`].
    fn get_all_assignments(
        &self,
        attributes: &HashMap<String, String>,
    ) -> HashMap<String, StickyAssignmentsDocument> {
        attributes
            .iter()
            .filter_map(|(name, value)| self.get_assignments(name, value))
            .map(|doc| (doc.key(), doc))
            .collect()
    }
}

/// [`StickyBucketService`] on top of a [`PersistenceLayer`].
pub struct LocalStickyBucketService {
    persistence: Arc<dyn PersistenceLayer>,
    prefix: String,
    // Serializes read-merge-write cycles so that concurrent saves don't lose assignments.
    write_lock: Mutex<()>,
}

impl LocalStickyBucketService {
    pub fn new(persistence: Arc<dyn PersistenceLayer>) -> Self {
        LocalStickyBucketService::with_prefix(persistence, STICKY_BUCKET_KEY_PREFIX)
    }

    pub fn with_prefix(persistence: Arc<dyn PersistenceLayer>, prefix: impl Into<String>) -> Self {
        LocalStickyBucketService {
            persistence,
            prefix: prefix.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn storage_key(&self, attribute_name: &str, attribute_value: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            document_key(attribute_name, attribute_value)
        )
    }

    fn load(&self, storage_key: &str) -> Option<StickyAssignmentsDocument> {
        let json = self.persistence.load(storage_key)?;
        match serde_json::from_value(json) {
            Ok(doc) => Some(doc),
            Err(err) => {
                log::warn!(target: "growthbook", storage_key, err:display; "ignoring corrupt sticky bucket document");
                None
            }
        }
    }
}

impl StickyBucketService for LocalStickyBucketService {
    fn get_assignments(
        &self,
        attribute_name: &str,
        attribute_value: &str,
    ) -> Option<StickyAssignmentsDocument> {
        self.load(&self.storage_key(attribute_name, attribute_value))
    }

    fn save_assignments(&self, doc: &StickyAssignmentsDocument) -> Result<()> {
        let storage_key = self.storage_key(&doc.attribute_name, &doc.attribute_value);

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Persistence("sticky bucket lock poisoned".to_owned()))?;

        let mut merged = self
            .load(&storage_key)
            .unwrap_or_else(|| StickyAssignmentsDocument::new(&doc.attribute_name, &doc.attribute_value));
        merged
            .assignments
            .extend(doc.assignments.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.persistence
            .save(&storage_key, serde_json::to_value(&merged)?)
    }
}
