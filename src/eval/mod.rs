//! Feature and experiment evaluation.
//!
//! Evaluation is a pure function of a [`Context`](crate::Context) snapshot. The only side effect
//! is writing new sticky bucket assignments.
mod eval_experiment;
mod eval_feature;
mod evaluator;
mod targeting;

pub use eval_experiment::run_experiment;
pub use eval_feature::evaluate_feature;
pub use evaluator::{Evaluator, DEFAULT_MAX_TRACKED_EXPOSURES};
