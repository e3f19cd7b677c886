use crate::experiment::{Experiment, ExperimentResult};

/// Receives exposure events: a user was placed into a variation of an experiment.
///
/// Forward these to your analytics pipeline. The [`Evaluator`](crate::Evaluator) calls the
/// callback at most once per user, experiment and variation.
///
/// Closures of type `Fn(&Experiment, &ExperimentResult)` can be used directly.
pub trait TrackingCallback: Send + Sync {
    /// Called after `result` was assigned for `experiment`.
    fn on_experiment_viewed(&self, experiment: &Experiment, result: &ExperimentResult);
}

pub(crate) struct NoopTrackingCallback;
impl TrackingCallback for NoopTrackingCallback {
    fn on_experiment_viewed(&self, _experiment: &Experiment, _result: &ExperimentResult) {}
}

impl<T: Fn(&Experiment, &ExperimentResult) + Send + Sync> TrackingCallback for T {
    fn on_experiment_viewed(&self, experiment: &Experiment, result: &ExperimentResult) {
        self(experiment, result);
    }
}
