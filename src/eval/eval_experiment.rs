use std::{borrow::Cow, collections::HashMap};

use crate::{
    bucketing::{choose_variation, get_bucket_ranges, hash, in_namespace},
    context::Context,
    experiment::{Experiment, ExperimentResult},
    sticky_bucket::{experiment_key, StickyAssignmentsDocument, StickyBucketService},
};

use super::targeting::{is_filtered_out, HashIdentity};

/// Why a user was not placed into an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exclusion {
    TooFewVariations,
    Disabled,
    Inactive,
    MissingHashAttribute,
    BlockedBucketVersion,
    FilteredOut,
    NotInNamespace,
    ConditionFailed,
    UnsupportedHashVersion,
    NotInRange,
    QaMode,
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Exclusion::TooFewVariations => "fewer than 2 variations",
            Exclusion::Disabled => "context disabled",
            Exclusion::Inactive => "experiment inactive",
            Exclusion::MissingHashAttribute => "missing hash attribute",
            Exclusion::BlockedBucketVersion => "sticky bucket version blocked",
            Exclusion::FilteredOut => "filtered out",
            Exclusion::NotInNamespace => "not in namespace",
            Exclusion::ConditionFailed => "condition failed",
            Exclusion::UnsupportedHashVersion => "unsupported hash version",
            Exclusion::NotInRange => "not in any bucket range",
            Exclusion::QaMode => "qa mode",
        })
    }
}

/// Assign the user of `context` to a variation of `experiment`.
///
/// `feature_id` is the key of the feature the experiment belongs to, if any. Assignment never
/// fails: every exit produces a defined result, with `in_experiment == false` when the user was
/// not bucketed.
///
/// If sticky bucketing is enabled, a new assignment is written to the sticky bucket store before
/// returning.
pub fn run_experiment(
    context: &Context,
    experiment: &Experiment,
    feature_id: Option<&str>,
) -> ExperimentResult {
    let key = experiment.tracking_key();

    let experiment: Cow<Experiment> = match context.overrides.get(&*key) {
        Some(overrides) => {
            let mut experiment = experiment.clone();
            experiment.apply_override(overrides);
            Cow::Owned(experiment)
        }
        None => Cow::Borrowed(experiment),
    };
    let experiment = &*experiment;

    let builder = ResultBuilder {
        experiment,
        key: &key,
        identity: HashIdentity::resolve(
            &context.attributes,
            experiment.hash_attribute.as_deref(),
            experiment.fallback_attribute.as_deref(),
        ),
        feature_id,
    };

    if experiment.variations.len() < 2 {
        return builder.excluded(Exclusion::TooFewVariations);
    }
    if !context.enabled {
        return builder.excluded(Exclusion::Disabled);
    }

    if let Some(&forced) = context.forced_variations.get(&*key) {
        log::trace!(target: "growthbook", experiment_key = &*key, variation = forced; "forced variation");
        return builder.build(forced, false, None, false);
    }

    if !experiment.active {
        return builder.excluded(Exclusion::Inactive);
    }

    if builder.identity.is_empty() {
        return builder.excluded(Exclusion::MissingHashAttribute);
    }

    let sticky = StickyBucketing::new(context, experiment);
    if let Some(sticky) = &sticky {
        match sticky.lookup(experiment, &key) {
            StickyLookup::Found(variation) => {
                let bucket = hash(
                    experiment.seed.as_deref().unwrap_or(&key),
                    &builder.identity.value,
                    experiment.hash_version(),
                );
                log::trace!(target: "growthbook", experiment_key = &*key, variation; "sticky bucket used");
                return builder.build(variation, true, bucket, true);
            }
            StickyLookup::Blocked => {
                let mut result = builder.excluded(Exclusion::BlockedBucketVersion);
                result.sticky_bucket_used = true;
                return result;
            }
            StickyLookup::NotFound => {}
        }
    }

    if !experiment.filters.is_empty() {
        if is_filtered_out(&experiment.filters, &context.attributes) {
            return builder.excluded(Exclusion::FilteredOut);
        }
    } else if let Some(namespace) = &experiment.namespace {
        if !in_namespace(&builder.identity.value, namespace) {
            return builder.excluded(Exclusion::NotInNamespace);
        }
    }

    if let Some(condition) = &experiment.condition {
        if !condition.eval(&context.attributes, &context.saved_groups) {
            return builder.excluded(Exclusion::ConditionFailed);
        }
    }

    let seed = experiment.seed.as_deref().unwrap_or(&key);
    let Some(n) = hash(seed, &builder.identity.value, experiment.hash_version()) else {
        return builder.excluded(Exclusion::UnsupportedHashVersion);
    };

    let ranges = match &experiment.ranges {
        Some(ranges) => ranges.clone(),
        None => get_bucket_ranges(
            experiment.variations.len(),
            experiment.coverage.unwrap_or(1.0),
            experiment.weights.as_deref(),
        ),
    };
    let Some(assigned) = choose_variation(n, &ranges) else {
        return builder.excluded(Exclusion::NotInRange);
    };

    if let Some(force) = experiment.force {
        return builder.build(force, false, None, false);
    }

    if context.qa_mode {
        return builder.excluded(Exclusion::QaMode);
    }

    let result = builder.build(assigned, true, Some(n), false);

    if let Some(sticky) = &sticky {
        sticky.save(experiment, &key, &builder.identity, assigned);
    }

    log::trace!(target: "growthbook",
                experiment_key = &*key,
                variation = assigned,
                bucket = n;
                "assigned variation");
    result
}

struct ResultBuilder<'a> {
    experiment: &'a Experiment,
    key: &'a str,
    identity: HashIdentity,
    feature_id: Option<&'a str>,
}

impl ResultBuilder<'_> {
    fn excluded(&self, reason: Exclusion) -> ExperimentResult {
        log::trace!(target: "growthbook", experiment_key = self.key, reason:display; "user not in experiment");
        self.build(0, false, None, false)
    }

    fn build(
        &self,
        variation_id: usize,
        in_experiment: bool,
        bucket: Option<f64>,
        sticky_bucket_used: bool,
    ) -> ExperimentResult {
        let experiment = self.experiment;
        let (variation_id, in_experiment) = if variation_id < experiment.variations.len() {
            (variation_id, in_experiment)
        } else {
            (0, false)
        };
        let meta = experiment.meta.get(variation_id);

        ExperimentResult {
            in_experiment,
            variation_id,
            value: experiment
                .variations
                .get(variation_id)
                .cloned()
                .unwrap_or(crate::Value::Null),
            key: experiment.variation_key(variation_id),
            name: meta.and_then(|meta| meta.name.clone()),
            hash_attribute: self.identity.attribute.clone(),
            hash_value: self.identity.value.clone(),
            bucket,
            passthrough: meta.is_some_and(|meta| meta.passthrough),
            hash_used: in_experiment && bucket.is_some(),
            feature_id: self.feature_id.map(str::to_owned),
            sticky_bucket_used,
        }
    }
}

enum StickyLookup {
    Found(usize),
    Blocked,
    NotFound,
}

/// Sticky bucketing for one evaluation: the store, and the documents of the user's hash and
/// fallback identities.
struct StickyBucketing<'a> {
    service: &'a dyn StickyBucketService,
    /// Assignments of the fallback identity overlaid with those of the primary identity.
    assignments: HashMap<String, String>,
}

impl<'a> StickyBucketing<'a> {
    fn new(context: &'a Context, experiment: &Experiment) -> Option<StickyBucketing<'a>> {
        if experiment.disable_sticky_bucketing {
            return None;
        }
        let service = context.sticky_bucket_service.as_deref()?;

        let primary = HashIdentity::resolve(
            &context.attributes,
            experiment.hash_attribute.as_deref(),
            None,
        );
        let fallback = experiment.fallback_attribute.as_deref().map(|fallback| {
            HashIdentity::resolve(&context.attributes, Some(fallback), None)
        });

        let mut assignments = HashMap::new();
        for identity in [fallback, Some(primary)].into_iter().flatten() {
            if identity.is_empty() {
                continue;
            }
            if let Some(doc) = service.get_assignments(&identity.attribute, &identity.value) {
                assignments.extend(doc.assignments);
            }
        }

        Some(StickyBucketing {
            service,
            assignments,
        })
    }

    fn lookup(&self, experiment: &Experiment, key: &str) -> StickyLookup {
        // Users assigned under a blocked bucket version are excluded from the experiment.
        let min_bucket_version = experiment.min_bucket_version.unwrap_or(0);
        if (0..min_bucket_version)
            .any(|version| self.assignments.contains_key(&experiment_key(key, version)))
        {
            return StickyLookup::Blocked;
        }

        self.assignments
            .get(&experiment_key(key, experiment.bucket_version()))
            .and_then(|variation_key| experiment.variation_index(variation_key))
            .map_or(StickyLookup::NotFound, StickyLookup::Found)
    }

    fn save(&self, experiment: &Experiment, key: &str, identity: &HashIdentity, variation: usize) {
        let assignment_key = experiment_key(key, experiment.bucket_version());
        let variation_key = experiment.variation_key(variation);
        if self.assignments.get(&assignment_key) == Some(&variation_key) {
            return;
        }

        let mut doc = StickyAssignmentsDocument::new(&identity.attribute, &identity.value);
        doc.assignments.insert(assignment_key, variation_key);
        if let Err(err) = self.service.save_assignments(&doc) {
            log::warn!(target: "growthbook", experiment_key = key, err:display; "failed to save sticky bucket assignment");
        }
    }
}
