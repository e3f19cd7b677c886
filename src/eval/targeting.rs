use crate::{
    attributes::Attributes,
    bucketing::{hash, BucketRange},
    experiment::Filter,
};

const DEFAULT_HASH_ATTRIBUTE: &str = "id";
const DEFAULT_FILTER_HASH_VERSION: u32 = 2;

/// Attribute a user is hashed by, and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct HashIdentity {
    pub attribute: String,
    pub value: String,
}

impl HashIdentity {
    /// Resolve `attribute` (default `"id"`), falling back to `fallback` if the primary value is
    /// missing or empty. An empty `value` means the user can't be hashed.
    pub fn resolve(
        attributes: &Attributes,
        attribute: Option<&str>,
        fallback: Option<&str>,
    ) -> HashIdentity {
        let attribute = attribute.unwrap_or(DEFAULT_HASH_ATTRIBUTE);
        let value = hash_value(attributes, attribute);

        if value.is_empty() {
            if let Some(fallback) = fallback {
                let fallback_value = hash_value(attributes, fallback);
                if !fallback_value.is_empty() {
                    return HashIdentity {
                        attribute: fallback.to_owned(),
                        value: fallback_value,
                    };
                }
            }
        }

        HashIdentity {
            attribute: attribute.to_owned(),
            value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

fn hash_value(attributes: &Attributes, attribute: &str) -> String {
    attributes
        .get(attribute)
        .map(|value| value.to_hash_string())
        .unwrap_or_default()
}

/// Return `true` if any filter excludes the user.
///
/// Users without a value for a filter's attribute are excluded.
pub(super) fn is_filtered_out(filters: &[Filter], attributes: &Attributes) -> bool {
    filters.iter().any(|filter| {
        let identity = HashIdentity::resolve(attributes, filter.attribute.as_deref(), None);
        if identity.is_empty() {
            return true;
        }
        let version = filter.hash_version.unwrap_or(DEFAULT_FILTER_HASH_VERSION);
        match hash(&filter.seed, &identity.value, version) {
            Some(n) => !filter.ranges.iter().any(|range| range.contains(n)),
            None => true,
        }
    })
}

/// Settings of a gradual rollout of a force rule.
pub(super) struct Rollout<'a> {
    pub seed: &'a str,
    pub hash_attribute: Option<&'a str>,
    pub fallback_attribute: Option<&'a str>,
    pub hash_version: Option<u32>,
    pub range: Option<BucketRange>,
    pub coverage: Option<f64>,
}

/// Return `true` if the user falls into the rollout.
///
/// `range` takes precedence over `coverage`. Without either, everyone is included. Users that
/// can't be hashed are never included in a partial rollout.
pub(super) fn is_included_in_rollout(attributes: &Attributes, rollout: &Rollout) -> bool {
    if rollout.range.is_none() && rollout.coverage.is_none() {
        return true;
    }

    let identity = HashIdentity::resolve(
        attributes,
        rollout.hash_attribute,
        rollout.fallback_attribute,
    );
    if identity.is_empty() {
        return false;
    }

    let Some(n) = hash(rollout.seed, &identity.value, rollout.hash_version.unwrap_or(1)) else {
        return false;
    };

    match (rollout.range, rollout.coverage) {
        (Some(range), _) => range.contains(n),
        (None, Some(coverage)) => n <= coverage,
        (None, None) => true,
    }
}
