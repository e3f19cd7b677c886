use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    context::ContextStore,
    experiment::{Experiment, ExperimentResult},
    features::FeatureResult,
    tracking::{NoopTrackingCallback, TrackingCallback},
};

use super::{eval_experiment::run_experiment, eval_feature::evaluate_feature};

/// Default number of distinct exposures remembered for de-duplication.
pub const DEFAULT_MAX_TRACKED_EXPOSURES: usize = 10_000;

/// Evaluates features and experiments against the latest published [`Context`](crate::Context)
/// and reports exposures to a [`TrackingCallback`].
///
/// Cheap to share between threads: each evaluation takes a snapshot of the context and never
/// blocks writers.
pub struct Evaluator {
    store: Arc<ContextStore>,
    tracking_callback: Arc<dyn TrackingCallback>,
    /// `(hash attribute, hash value, experiment key, variation)` of reported exposures.
    ///
    /// Cleared when it reaches `max_tracked`, after which exposures may be reported again.
    tracked: Mutex<HashSet<(String, String, String, usize)>>,
    max_tracked: usize,
}

impl Evaluator {
    /// Create an evaluator that does not report exposures.
    pub fn new(store: Arc<ContextStore>) -> Evaluator {
        Evaluator::with_tracking_callback(store, Arc::new(NoopTrackingCallback))
    }

    pub fn with_tracking_callback(
        store: Arc<ContextStore>,
        tracking_callback: Arc<dyn TrackingCallback>,
    ) -> Evaluator {
        Evaluator {
            store,
            tracking_callback,
            tracked: Mutex::new(HashSet::new()),
            max_tracked: DEFAULT_MAX_TRACKED_EXPOSURES,
        }
    }

    /// Bound the memory used to de-duplicate exposures.
    pub fn with_max_tracked_exposures(mut self, max_tracked: usize) -> Evaluator {
        self.max_tracked = max_tracked;
        self
    }

    pub fn context_store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Evaluate feature `key`.
    pub fn evaluate_feature(&self, key: &str) -> FeatureResult {
        let context = self.store.get_context();
        let result = evaluate_feature(&context, key);

        log::trace!(target: "growthbook",
                    feature_key = key,
                    result:serde;
                    "evaluated a feature");

        if let (Some(experiment), Some(experiment_result)) =
            (&result.experiment, &result.experiment_result)
        {
            self.track(experiment, experiment_result);
        }
        result
    }

    /// `true` if feature `key` evaluates to a truthy value.
    pub fn is_on(&self, key: &str) -> bool {
        self.evaluate_feature(key).on
    }

    /// Run a standalone experiment.
    pub fn run_experiment(&self, experiment: &Experiment) -> ExperimentResult {
        let context = self.store.get_context();
        let result = run_experiment(&context, experiment, None);
        self.track(experiment, &result);
        result
    }

    fn track(&self, experiment: &Experiment, result: &ExperimentResult) {
        if !result.in_experiment {
            return;
        }

        let key = (
            result.hash_attribute.clone(),
            result.hash_value.clone(),
            experiment.tracking_key().into_owned(),
            result.variation_id,
        );
        let first_time = {
            let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
            if tracked.contains(&key) {
                false
            } else {
                if tracked.len() >= self.max_tracked {
                    log::debug!(target: "growthbook", exposures = tracked.len(); "forgetting tracked exposures");
                    tracked.clear();
                }
                tracked.insert(key)
            }
        };
        if first_time {
            log::trace!(target: "growthbook",
                        experiment_key = &*experiment.tracking_key(),
                        variation = result.variation_id;
                        "tracking experiment exposure");
            self.tracking_callback
                .on_experiment_viewed(experiment, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::Evaluator;
    use crate::{
        context::{Context, ContextStore},
        experiment::{Experiment, ExperimentResult},
        features::FeatureDefinitions,
        Attributes, Value,
    };

    fn store(id: &str) -> Arc<ContextStore> {
        let definitions = FeatureDefinitions {
            features: serde_json::from_value(json!({
                "button": {"defaultValue": "none", "rules": [{"key": "t1", "variations": ["A", "B"]}]},
                "flag": {"defaultValue": true}
            }))
            .unwrap(),
            ..Default::default()
        };
        let store = Arc::new(ContextStore::new(
            Context::new("key", "https://example.com")
                .with_attributes(Attributes::from([("id".to_owned(), Value::from(id))])),
        ));
        store.set_features(definitions);
        store
    }

    fn recording_evaluator(store: Arc<ContextStore>) -> (Evaluator, Arc<Mutex<Vec<(String, usize)>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let callback = {
            let events = events.clone();
            move |experiment: &Experiment, result: &ExperimentResult| {
                events
                    .lock()
                    .unwrap()
                    .push((experiment.key.clone(), result.variation_id));
            }
        };
        (
            Evaluator::with_tracking_callback(store, Arc::new(callback)),
            events,
        )
    }

    #[test]
    fn tracks_each_exposure_once() {
        let (evaluator, events) = recording_evaluator(store("user1"));

        assert_eq!(evaluator.evaluate_feature("button").value, Value::from("A"));
        assert_eq!(evaluator.evaluate_feature("button").value, Value::from("A"));
        assert_eq!(events.lock().unwrap().as_slice(), [("t1".to_owned(), 0)]);

        // different user, different exposure
        evaluator
            .context_store()
            .set_attributes(Attributes::from([("id".to_owned(), Value::from("user123"))]));
        assert_eq!(evaluator.evaluate_feature("button").value, Value::from("B"));
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn does_not_track_without_experiment() {
        let (evaluator, events) = recording_evaluator(store("user1"));
        assert!(evaluator.is_on("flag"));
        assert!(!evaluator.is_on("missing"));

        let mut experiment = Experiment::new("t1", vec![Value::from("A"), Value::from("B")]);
        experiment.coverage = Some(0.0);
        assert!(!evaluator.run_experiment(&experiment).in_experiment);

        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn standalone_experiment() {
        let (evaluator, events) = recording_evaluator(store("user1"));
        let experiment = Experiment::new("t1", vec![Value::from("A"), Value::from("B")]);
        let result = evaluator.run_experiment(&experiment);
        assert!(result.in_experiment);
        assert_eq!(result.feature_id, None);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn tracked_exposures_are_bounded() {
        let (evaluator, events) = recording_evaluator(store("user1"));
        let evaluator = evaluator.with_max_tracked_exposures(1);

        evaluator.evaluate_feature("button");
        evaluator.evaluate_feature("button");
        assert_eq!(events.lock().unwrap().len(), 1);

        // user123 evicts user1, so user1 is reported again
        for id in ["user123", "user1"] {
            evaluator
                .context_store()
                .set_attributes(Attributes::from([("id".to_owned(), Value::from(id))]));
            evaluator.evaluate_feature("button");
        }
        assert_eq!(events.lock().unwrap().len(), 3);
        assert_eq!(evaluator.tracked.lock().unwrap().len(), 1);
    }

    #[test]
    fn noop_tracking() {
        let evaluator = Evaluator::new(store("user1"));
        assert_eq!(evaluator.evaluate_feature("button").value, Value::from("A"));
    }
}
