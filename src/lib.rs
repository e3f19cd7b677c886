//! Core of the GrowthBook SDK: feature flags and A/B experiments evaluated locally against
//! remotely-configured definitions.
//!
//! # Overview
//!
//! Everything evaluation needs lives in a [`Context`]: user attributes, feature definitions,
//! saved groups, and the host's overrides. A [`ContextStore`] publishes the context as an
//! immutable snapshot that is replaced as a whole whenever something changes, so evaluation never
//! observes a half-applied update.
//!
//! [`evaluate_feature`] and [`run_experiment`] are pure functions of a context snapshot. The
//! [`Evaluator`] helper pulls the latest snapshot from a store and reports experiment exposures to
//! a [`TrackingCallback`].
//!
//! A [`FeatureRefresher`] keeps the store current. It fetches the features endpoint with
//! conditional requests, restores and saves a local snapshot through a [`PersistenceLayer`], and
//! can listen to a server-sent events stream that reconnects with exponential backoff.
//!
//! Users keep their experiment variation across configuration changes when a
//! [`StickyBucketService`] is configured.
//!
//! # Error Handling
//!
//! Evaluation never fails: unknown features, missing attributes, and malformed conditions all
//! resolve to a defined result. Errors of the live update pipeline are represented by the
//! [`Error`] enum and reported to a [`FeaturesDelegate`]. Previous definitions stay in effect
//! when an update fails.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with target `growthbook`
//! for logging messages. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use growthbook::{Attributes, Context, ContextStore, Evaluator, Value};
//!
//! let features = serde_json::from_str(
//!     r#"{"color": {"defaultValue": "red", "rules": [{"condition": {"country": "IN"}, "force": "blue"}]}}"#,
//! )
//! .unwrap();
//! let context = Context::new("sdk-key", "https://cdn.growthbook.io")
//!     .with_features(features)
//!     .with_attributes(Attributes::from([("country".to_owned(), Value::from("IN"))]));
//!
//! let evaluator = Evaluator::new(Arc::new(ContextStore::new(context)));
//! assert_eq!(evaluator.evaluate_feature("color").value, Value::from("blue"));
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod attributes;
pub mod bucketing;
pub mod condition;
mod config;
pub mod configuration_fetcher;
pub mod connection_state;
mod context;
mod error;
pub mod etag_cache;
mod eval;
pub mod experiment;
pub mod features;
pub mod persistence;
pub mod reconnect;
mod refresher;
pub mod sse;
pub mod sticky_bucket;
mod tracking;
pub mod transport;
mod value;

pub use attributes::{AttributePath, Attributes};
pub use condition::{Condition, SavedGroups};
pub use config::RefreshConfig;
pub use connection_state::{ConnectionState, ConnectionStateController};
pub use context::{Context, ContextStore};
pub use error::{Error, Result};
pub use etag_cache::EtagCache;
pub use eval::{evaluate_feature, run_experiment, Evaluator, DEFAULT_MAX_TRACKED_EXPOSURES};
pub use experiment::{Experiment, ExperimentOverride, ExperimentResult};
pub use features::{
    Feature, FeatureDecryptor, FeatureDefinitions, FeatureResult, FeatureRule, FeatureSource,
    FeaturesPayload,
};
pub use persistence::{InMemoryPersistence, PersistenceLayer};
pub use reconnect::ReconnectPolicy;
pub use refresher::{FeatureRefresher, FeaturesDelegate, FEATURE_CACHE_KEY};
pub use sticky_bucket::{LocalStickyBucketService, StickyAssignmentsDocument, StickyBucketService};
pub use tracking::TrackingCallback;
pub use transport::{EventStream, HttpResponse, ReqwestTransport, Transport};
pub use value::Value;
