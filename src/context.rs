//! Evaluation context and its thread-safe store.
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use url::Url;

use crate::{
    condition::SavedGroups,
    experiment::ExperimentOverride,
    features::{Feature, FeatureDefinitions},
    sticky_bucket::StickyBucketService,
    Attributes, Result,
};

/// Everything evaluation needs to know: who the user is, which features exist, and how the host
/// wants to steer experiments.
///
/// `Context` is immutable once published to a [`ContextStore`]. Updates are applied to a copy
/// that then replaces the published context as a whole.
#[derive(Clone)]
pub struct Context {
    pub api_key: String,
    pub host_url: String,
    pub attributes: Attributes,
    /// Switch to disable all experiments.
    pub enabled: bool,
    /// In QA mode users are only placed in forced variations.
    pub qa_mode: bool,
    /// Maps experiment tracking key to variation index.
    pub forced_variations: HashMap<String, usize>,
    /// Maps experiment tracking key to fields that replace the served ones.
    pub overrides: HashMap<String, ExperimentOverride>,
    pub features: Arc<HashMap<String, Feature>>,
    pub saved_groups: Arc<SavedGroups>,
    pub sticky_bucket_service: Option<Arc<dyn StickyBucketService>>,
}

impl Context {
    pub fn new(api_key: impl Into<String>, host_url: impl Into<String>) -> Context {
        Context {
            api_key: api_key.into(),
            host_url: host_url.into(),
            attributes: Attributes::new(),
            enabled: true,
            qa_mode: false,
            forced_variations: HashMap::new(),
            overrides: HashMap::new(),
            features: Arc::new(HashMap::new()),
            saved_groups: Arc::new(SavedGroups::new()),
            sticky_bucket_service: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Context {
        self.attributes = attributes;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Context {
        self.enabled = enabled;
        self
    }

    pub fn with_qa_mode(mut self, qa_mode: bool) -> Context {
        self.qa_mode = qa_mode;
        self
    }

    pub fn with_forced_variations(mut self, forced_variations: HashMap<String, usize>) -> Context {
        self.forced_variations = forced_variations;
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, ExperimentOverride>) -> Context {
        self.overrides = overrides;
        self
    }

    pub fn with_features(mut self, features: HashMap<String, Feature>) -> Context {
        self.features = Arc::new(features);
        self
    }

    pub fn with_saved_groups(mut self, saved_groups: SavedGroups) -> Context {
        self.saved_groups = Arc::new(saved_groups);
        self
    }

    pub fn with_sticky_bucket_service(
        mut self,
        sticky_bucket_service: Arc<dyn StickyBucketService>,
    ) -> Context {
        self.sticky_bucket_service = Some(sticky_bucket_service);
        self
    }

    /// URL of the features endpoint: `{host}/api/features/{apiKey}`.
    pub fn features_url(&self) -> Result<Url> {
        self.endpoint(&["api", "features", &self.api_key])
    }

    /// URL of the server-sent events stream: `{host}/sub/{apiKey}`.
    pub fn stream_url(&self) -> Result<Url> {
        self.endpoint(&["sub", &self.api_key])
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.host_url)?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("host_url", &self.host_url)
            .field("attributes", &self.attributes)
            .field("enabled", &self.enabled)
            .field("qa_mode", &self.qa_mode)
            .field("forced_variations", &self.forced_variations)
            .field("overrides", &self.overrides)
            .field("features", &self.features.len())
            .field("saved_groups", &self.saved_groups.len())
            .field(
                "sticky_bucket_service",
                &self.sticky_bucket_service.is_some(),
            )
            .finish_non_exhaustive()
    }
}

/// `ContextStore` provides a thread-safe (`Sync`) storage for the [`Context`] that allows
/// concurrent access for readers (evaluation) and writers (feature refresher, host application).
///
/// Readers always observe a complete context: either the one before an update or the one after
/// it, never a mix.
pub struct ContextStore {
    context: RwLock<Arc<Context>>,
}

impl ContextStore {
    pub fn new(context: Context) -> Self {
        ContextStore {
            context: RwLock::new(Arc::new(context)),
        }
    }

    /// Get currently-active context.
    pub fn get_context(&self) -> Arc<Context> {
        // The slot is only ever assigned a complete context, so a lock poisoned by a panicking
        // `update` closure still holds a consistent value.
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace context, returning the previous one.
    pub fn set_context(&self, context: Context) -> Arc<Context> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(context);

        let mut slot = self.context.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, new_value)
    }

    /// Apply `f` to a copy of the current context and publish the result.
    ///
    /// Concurrent updates are serialized, so none of them is lost.
    pub fn update(&self, f: impl FnOnce(&mut Context)) {
        let mut slot = self.context.write().unwrap_or_else(PoisonError::into_inner);
        let mut context = Context::clone(&slot);
        f(&mut context);
        *slot = Arc::new(context);
    }

    /// Replace features and saved groups.
    pub fn set_features(&self, definitions: FeatureDefinitions) {
        let features = Arc::new(definitions.features);
        let saved_groups = Arc::new(definitions.saved_groups);
        self.update(move |context| {
            context.features = features;
            context.saved_groups = saved_groups;
        });
    }

    pub fn set_attributes(&self, attributes: Attributes) {
        self.update(move |context| context.attributes = attributes);
    }

    pub fn set_forced_variations(&self, forced_variations: HashMap<String, usize>) {
        self.update(move |context| context.forced_variations = forced_variations);
    }
}
