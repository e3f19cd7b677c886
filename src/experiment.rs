use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{
    bucketing::{fnv1a32, BucketRange, Namespace},
    condition::Condition,
    Value,
};

/// An A/B(/n) test: a set of variations with weights and coverage that partitions hashed users.
///
/// Experiments are usually built from experiment rules of a feature, but can also be evaluated
/// standalone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    /// Tracking key. An empty key is replaced with one derived from the variations.
    #[serde(default, alias = "trackingKey")]
    pub key: String,
    pub variations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Explicit per-variation ranges. When set, `weights` and `coverage` are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<BucketRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<VariationMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Variation index returned to everyone who is bucketed into the experiment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<usize>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub disable_sticky_bucketing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bucket_version: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl Experiment {
    /// Create an active experiment with default settings.
    pub fn new(key: impl Into<String>, variations: Vec<Value>) -> Experiment {
        Experiment {
            key: key.into(),
            variations,
            weights: None,
            coverage: None,
            ranges: None,
            condition: None,
            namespace: None,
            hash_attribute: None,
            fallback_attribute: None,
            hash_version: None,
            filters: Vec::new(),
            seed: None,
            meta: Vec::new(),
            name: None,
            phase: None,
            force: None,
            active: true,
            disable_sticky_bucketing: false,
            bucket_version: None,
            min_bucket_version: None,
        }
    }

    /// Return the tracking key, deriving a stable one from the variations if none was set.
    pub fn tracking_key(&self) -> Cow<'_, str> {
        if !self.key.is_empty() {
            return Cow::Borrowed(&self.key);
        }
        let variations = serde_json::Value::from(Value::Array(self.variations.clone()));
        Cow::Owned(format!("exp_{:08x}", fnv1a32(&variations.to_string())))
    }

    pub fn hash_attribute(&self) -> &str {
        self.hash_attribute.as_deref().unwrap_or("id")
    }

    pub fn hash_version(&self) -> u32 {
        self.hash_version.unwrap_or(1)
    }

    pub fn bucket_version(&self) -> u32 {
        self.bucket_version.unwrap_or(0)
    }

    /// Key of the variation at `index` used in sticky bucket documents.
    pub(crate) fn variation_key(&self, index: usize) -> String {
        self.meta
            .get(index)
            .and_then(|meta| meta.key.clone())
            .unwrap_or_else(|| index.to_string())
    }

    /// Inverse of [`Experiment::variation_key`].
    pub(crate) fn variation_index(&self, key: &str) -> Option<usize> {
        if let Some(index) = self
            .meta
            .iter()
            .position(|meta| meta.key.as_deref() == Some(key))
        {
            return Some(index);
        }
        // Bare indices are only used for variations without a meta key.
        key.parse::<usize>().ok().filter(|&index| {
            index < self.variations.len()
                && self.meta.get(index).map_or(true, |meta| meta.key.is_none())
        })
    }

    /// Apply host-supplied override on top of this experiment.
    pub fn apply_override(&mut self, overrides: &ExperimentOverride) {
        if let Some(weights) = &overrides.weights {
            self.weights = Some(weights.clone());
        }
        if let Some(coverage) = overrides.coverage {
            self.coverage = Some(coverage);
        }
        if let Some(condition) = &overrides.condition {
            self.condition = Some(condition.clone());
        }
        if let Some(force) = overrides.force {
            self.force = Some(force);
        }
        if let Some(active) = overrides.active {
            self.active = active;
        }
    }
}

/// Partial experiment supplied by the host application, keyed by tracking key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentOverride {
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    #[serde(default)]
    pub coverage: Option<f64>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub force: Option<usize>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Hash-range filter used to carve out mutually exclusive audiences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default)]
    pub seed: String,
    pub ranges: Vec<BucketRange>,
    #[serde(default, alias = "hashAttribute", skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Passthrough variations serve their value but are excluded from analysis.
    #[serde(default)]
    pub passthrough: bool,
}

/// Result of assigning a user to an experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    pub in_experiment: bool,
    pub variation_id: usize,
    pub value: Value,
    /// Variation key from `meta`, or the variation index.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub hash_attribute: String,
    pub hash_value: String,
    /// Hash of the user that was compared against bucket ranges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<f64>,
    pub passthrough: bool,
    /// `true` if the variation was chosen by hashing the user.
    pub hash_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    pub sticky_bucket_used: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Experiment, ExperimentOverride, VariationMeta};
    use crate::Value;

    #[test]
    fn decode_standalone_experiment() {
        let experiment: Experiment = serde_json::from_value(json!({
            "trackingKey": "t1",
            "variations": ["A", "B"],
            "coverage": 1,
            "namespace": ["pricing", 0, 0.5],
            "ranges": [[0, 0.3], [0.5, 0.8]],
            "meta": [{"key": "control"}, {"key": "treatment", "passthrough": true}]
        }))
        .unwrap();

        assert_eq!(experiment.key, "t1");
        assert!(experiment.active);
        assert_eq!(experiment.coverage, Some(1.0));
        assert_eq!(experiment.namespace.as_ref().unwrap().id, "pricing");
        assert_eq!(experiment.ranges.as_ref().unwrap()[1].end, 0.8);
        assert!(experiment.meta[1].passthrough);
        assert_eq!(experiment.hash_attribute(), "id");
        assert_eq!(experiment.hash_version(), 1);
    }

    #[test]
    fn derived_tracking_key_is_stable() {
        let experiment = Experiment::new("", vec![Value::from("A"), Value::from("B")]);
        let key = experiment.tracking_key().into_owned();
        assert!(key.starts_with("exp_"));
        assert_eq!(experiment.tracking_key(), key);

        let other = Experiment::new("", vec![Value::from("A"), Value::from("C")]);
        assert_ne!(other.tracking_key(), key);
    }

    #[test]
    fn variation_keys() {
        let mut experiment = Experiment::new("e", vec![Value::from(0), Value::from(1)]);
        assert_eq!(experiment.variation_key(1), "1");
        assert_eq!(experiment.variation_index("1"), Some(1));
        assert_eq!(experiment.variation_index("2"), None);

        experiment.meta = vec![
            VariationMeta {
                key: Some("control".into()),
                ..Default::default()
            },
            VariationMeta {
                key: Some("treatment".into()),
                ..Default::default()
            },
        ];
        assert_eq!(experiment.variation_key(1), "treatment");
        assert_eq!(experiment.variation_index("treatment"), Some(1));
        assert_eq!(experiment.variation_index("1"), None);
    }

    #[test]
    fn override_replaces_given_fields() {
        let mut experiment = Experiment::new("e", vec![Value::from(0), Value::from(1)]);
        experiment.coverage = Some(0.5);
        experiment.apply_override(&ExperimentOverride {
            weights: Some(vec![0.1, 0.9]),
            active: Some(false),
            ..Default::default()
        });
        assert_eq!(experiment.weights, Some(vec![0.1, 0.9]));
        assert_eq!(experiment.coverage, Some(0.5));
        assert!(!experiment.active);
    }
}
