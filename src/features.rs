//! Feature definitions as served by the features endpoint.
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    bucketing::{BucketRange, Namespace},
    condition::{Condition, SavedGroups},
    experiment::{Experiment, ExperimentResult, Filter, VariationMeta},
    Error, Result, Value,
};

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Response body of the features endpoint, also used for the local snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesPayload {
    /// Feature definitions.
    ///
    /// Each value is wrapped in `TryParse` so that a single feature the SDK cannot understand
    /// (e.g., new server format) does not prevent the rest from being served.
    #[serde(default)]
    pub features: HashMap<String, TryParse<Feature>>,
    /// Encrypted form of `features`, present when the SDK connection has encryption enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_features: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_groups: Option<SavedGroups>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_saved_groups: Option<String>,
    /// When features were last updated on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<Timestamp>,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Decrypts `encryptedFeatures`/`encryptedSavedGroups` payload fields into their JSON text.
///
/// Closures of the right shape implement this trait.
pub trait FeatureDecryptor: Send + Sync {
    fn decrypt(&self, encrypted: &str) -> Result<String>;
}

impl<F: Fn(&str) -> Result<String> + Send + Sync> FeatureDecryptor for F {
    fn decrypt(&self, encrypted: &str) -> Result<String> {
        self(encrypted)
    }
}

/// Decoded, ready-to-evaluate feature definitions.
#[derive(Debug, Clone, Default)]
pub struct FeatureDefinitions {
    pub features: HashMap<String, Feature>,
    pub saved_groups: SavedGroups,
    pub date_updated: Option<Timestamp>,
}

impl FeaturesPayload {
    /// Decode payload from its JSON representation.
    pub fn from_json(bytes: &[u8]) -> Result<FeaturesPayload> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Resolve encrypted fields and drop features that failed to parse.
    ///
    /// The encrypted form of a field is only consulted when the plain form is absent or empty.
    pub fn into_definitions(
        self,
        decryptor: Option<&dyn FeatureDecryptor>,
    ) -> Result<FeatureDefinitions> {
        let features = match self.encrypted_features {
            Some(encrypted) if self.features.is_empty() => {
                let decryptor = decryptor.ok_or(Error::MissingDecryptor)?;
                serde_json::from_str(&decryptor.decrypt(&encrypted)?)?
            }
            _ => self.features,
        };

        let saved_groups = match (self.saved_groups, self.encrypted_saved_groups) {
            (Some(groups), _) if !groups.is_empty() => groups,
            (_, Some(encrypted)) => {
                let decryptor = decryptor.ok_or(Error::MissingDecryptor)?;
                serde_json::from_str(&decryptor.decrypt(&encrypted)?)?
            }
            (groups, None) => groups.unwrap_or_default(),
        };

        Ok(FeatureDefinitions {
            features: parse_features(features),
            saved_groups,
            date_updated: self.date_updated,
        })
    }
}

fn parse_features(features: HashMap<String, TryParse<Feature>>) -> HashMap<String, Feature> {
    features
        .into_iter()
        .filter_map(|(key, feature)| match feature {
            TryParse::Parsed(feature) => Some((key, feature)),
            TryParse::ParseFailed(json) => {
                log::warn!(target: "growthbook", feature_key = key.as_str(), json:serde = json; "failed to parse feature");
                None
            }
        })
        .collect()
}

/// A named, remotely-configured value with optional targeting rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(default = "null_value")]
    pub default_value: Value,
    /// Rules are evaluated in order. First matching rule wins.
    #[serde(default)]
    pub rules: Vec<FeatureRule>,
}

impl Default for Feature {
    fn default() -> Self {
        Feature {
            default_value: Value::Null,
            rules: Vec::new(),
        }
    }
}

fn null_value() -> Value {
    Value::Null
}

/// A single targeting rule of a feature.
///
/// A rule with `force` is a force rule. A rule with `variations` is an experiment rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Forced value. `"force": null` forces a null value, so presence is tracked separately from
    /// the value.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub force: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Precise rollout range. Takes precedence over `coverage` for force rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<BucketRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<BucketRange>>,
    /// Experiment tracking key. Defaults to the feature key.
    #[serde(
        default,
        alias = "trackingKey",
        skip_serializing_if = "Option::is_none"
    )]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
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
    #[serde(default)]
    pub disable_sticky_bucketing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bucket_version: Option<u32>,
}

fn deserialize_present<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl FeatureRule {
    /// Build the experiment described by an experiment rule of feature `feature_key`.
    ///
    /// Returns `None` for rules without variations.
    pub fn to_experiment(&self, feature_key: &str) -> Option<Experiment> {
        let variations = self.variations.clone()?;
        Some(Experiment {
            key: self.key.clone().unwrap_or_else(|| feature_key.to_owned()),
            variations,
            weights: self.weights.clone(),
            coverage: self.coverage,
            ranges: self.ranges.clone(),
            condition: None,
            namespace: self.namespace.clone(),
            hash_attribute: self.hash_attribute.clone(),
            fallback_attribute: self.fallback_attribute.clone(),
            hash_version: self.hash_version,
            filters: self.filters.clone(),
            seed: self.seed.clone(),
            meta: self.meta.clone(),
            name: self.name.clone(),
            phase: self.phase.clone(),
            force: None,
            active: true,
            disable_sticky_bucketing: self.disable_sticky_bucketing,
            bucket_version: self.bucket_version,
            min_bucket_version: self.min_bucket_version,
        })
    }
}

/// Where the value of a [`FeatureResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureSource {
    /// Feature key is not defined.
    UnknownFeature,
    /// No rule matched.
    DefaultValue,
    /// A force rule matched.
    Force,
    /// User was placed into an experiment.
    Experiment,
}

impl FeatureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureSource::UnknownFeature => "unknownFeature",
            FeatureSource::DefaultValue => "defaultValue",
            FeatureSource::Force => "force",
            FeatureSource::Experiment => "experiment",
        }
    }
}

impl std::fmt::Display for FeatureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a feature for a set of attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    pub value: Value,
    pub on: bool,
    pub off: bool,
    pub source: FeatureSource,
    /// Id of the rule that produced the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Experiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_result: Option<ExperimentResult>,
}

impl FeatureResult {
    pub(crate) fn new(value: Value, source: FeatureSource) -> FeatureResult {
        let on = value.is_truthy();
        FeatureResult {
            value,
            on,
            off: !on,
            source,
            rule_id: None,
            experiment: None,
            experiment_result: None,
        }
    }

    pub(crate) fn unknown_feature() -> FeatureResult {
        FeatureResult::new(Value::Null, FeatureSource::UnknownFeature)
    }
}
