use crate::{
    context::Context,
    features::{FeatureResult, FeatureRule, FeatureSource},
};

use super::{
    eval_experiment::run_experiment,
    targeting::{is_filtered_out, is_included_in_rollout, Rollout},
};

/// Evaluate feature `key` for the user of `context`.
///
/// Rules are tried in order and the first one that applies determines the value. Features
/// missing from the context evaluate to `null` with [`FeatureSource::UnknownFeature`].
pub fn evaluate_feature(context: &Context, key: &str) -> FeatureResult {
    let Some(feature) = context.features.get(key) else {
        log::trace!(target: "growthbook", feature_key = key; "unknown feature");
        return FeatureResult::unknown_feature();
    };

    for rule in &feature.rules {
        if let Some(result) = evaluate_rule(context, key, rule) {
            log::trace!(target: "growthbook",
                        feature_key = key,
                        rule_id = rule.id.as_deref(),
                        source = result.source.as_str();
                        "evaluated feature");
            return result;
        }
    }

    FeatureResult::new(feature.default_value.clone(), FeatureSource::DefaultValue)
}

fn evaluate_rule(context: &Context, feature_key: &str, rule: &FeatureRule) -> Option<FeatureResult> {
    if is_filtered_out(&rule.filters, &context.attributes) {
        return None;
    }

    if let Some(condition) = &rule.condition {
        if !condition.eval(&context.attributes, &context.saved_groups) {
            return None;
        }
    }

    if let Some(force) = &rule.force {
        let rollout = Rollout {
            seed: rule.seed.as_deref().unwrap_or(feature_key),
            hash_attribute: rule.hash_attribute.as_deref(),
            fallback_attribute: rule.fallback_attribute.as_deref(),
            hash_version: rule.hash_version,
            range: rule.range,
            coverage: rule.coverage,
        };
        if !is_included_in_rollout(&context.attributes, &rollout) {
            return None;
        }

        let mut result = FeatureResult::new(force.clone(), FeatureSource::Force);
        result.rule_id = rule.id.clone();
        return Some(result);
    }

    let experiment = rule.to_experiment(feature_key)?;
    let experiment_result = run_experiment(context, &experiment, Some(feature_key));
    // Passthrough variations serve the next rule's value.
    if !experiment_result.in_experiment || experiment_result.passthrough {
        return None;
    }

    let mut result = FeatureResult::new(experiment_result.value.clone(), FeatureSource::Experiment);
    result.rule_id = rule.id.clone();
    result.experiment = Some(experiment);
    result.experiment_result = Some(experiment_result);
    Some(result)
}
