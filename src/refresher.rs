//! Keeps the [`ContextStore`] current: one-shot fetches, the local snapshot, and a
//! self-healing server-sent events stream.
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use url::Url;

use crate::{
    config::RefreshConfig,
    configuration_fetcher::{FeaturesFetcher, FetchOutcome},
    connection_state::{stopped, ConnectionState, ConnectionStateController},
    context::ContextStore,
    features::{FeatureDecryptor, FeaturesPayload},
    persistence::PersistenceLayer,
    reconnect::ReconnectPolicy,
    sse::{SseDecoder, SseEvent},
    transport::Transport,
    Error, Result,
};

/// Persistence key of the last successfully applied payload.
pub const FEATURE_CACHE_KEY: &str = "FeatureCache";

/// Receives the outcome of every attempt to refresh feature definitions.
///
/// `is_remote` is `false` for the local snapshot and `true` for network updates.
///
/// Closures of type `Fn(Result<()>, bool)` can be used directly.
pub trait FeaturesDelegate: Send + Sync {
    /// New definitions were applied.
    fn features_fetched(&self, is_remote: bool);

    /// Definitions could not be fetched or decoded. Previous definitions stay in effect.
    fn features_fetch_failed(&self, error: &Error, is_remote: bool);
}

pub(crate) struct NoopFeaturesDelegate;
impl FeaturesDelegate for NoopFeaturesDelegate {
    fn features_fetched(&self, _is_remote: bool) {}
    fn features_fetch_failed(&self, _error: &Error, _is_remote: bool) {}
}

impl<T: Fn(Result<()>, bool) + Send + Sync> FeaturesDelegate for T {
    fn features_fetched(&self, is_remote: bool) {
        self(Ok(()), is_remote);
    }

    fn features_fetch_failed(&self, error: &Error, is_remote: bool) {
        self(Err(error.clone()), is_remote);
    }
}

/// Collaborators shared between the refresher and its streaming task.
#[derive(Clone)]
struct Pipeline {
    store: Arc<ContextStore>,
    fetcher: Arc<FeaturesFetcher>,
    transport: Arc<dyn Transport>,
    persistence: Option<Arc<dyn PersistenceLayer>>,
    decryptor: Option<Arc<dyn FeatureDecryptor>>,
    delegate: Arc<dyn FeaturesDelegate>,
}

impl Pipeline {
    /// Decode `body` and publish it, keeping previous definitions on failure.
    fn apply(&self, body: &[u8], is_remote: bool) -> Result<()> {
        let result = FeaturesPayload::from_json(body)
            .and_then(|payload| payload.into_definitions(self.decryptor.as_deref()));

        match result {
            Ok(definitions) => {
                log::debug!(target: "growthbook",
                            features = definitions.features.len(),
                            is_remote;
                            "applying feature definitions");
                self.store.set_features(definitions);
                if is_remote {
                    self.save_snapshot(body);
                }
                self.delegate.features_fetched(is_remote);
                Ok(())
            }
            Err(err) => {
                log::warn!(target: "growthbook", is_remote, err:display; "failed to apply features payload");
                self.delegate.features_fetch_failed(&err, is_remote);
                Err(err)
            }
        }
    }

    fn save_snapshot(&self, body: &[u8]) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let saved = serde_json::from_slice(body)
            .map_err(Error::from)
            .and_then(|json| persistence.save(FEATURE_CACHE_KEY, json));
        if let Err(err) = saved {
            log::warn!(target: "growthbook", err:display; "failed to save features snapshot");
        }
    }

    fn handle_event(&self, event: SseEvent) {
        match event.event.as_deref() {
            None | Some("features") => {
                // Failures are reported to the delegate. The stream stays open.
                let _ = self.apply(event.data.as_bytes(), true);
            }
            Some(other) => {
                log::debug!(target: "growthbook", event = other; "ignoring stream event");
            }
        }
    }
}

/// Background updater of feature definitions.
///
/// Dropping the refresher stops the stream.
pub struct FeatureRefresher {
    pipeline: Pipeline,
    config: RefreshConfig,
    connection: Arc<ConnectionStateController>,
    reconnect: Arc<ReconnectPolicy>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes stream restarts and shutdowns.
    restart: tokio::sync::Mutex<()>,
}

impl FeatureRefresher {
    pub fn new(store: Arc<ContextStore>, transport: Arc<dyn Transport>) -> FeatureRefresher {
        FeatureRefresher::with_config(store, transport, RefreshConfig::default())
    }

    pub fn with_config(
        store: Arc<ContextStore>,
        transport: Arc<dyn Transport>,
        config: RefreshConfig,
    ) -> FeatureRefresher {
        FeatureRefresher {
            pipeline: Pipeline {
                store,
                fetcher: Arc::new(FeaturesFetcher::new(
                    transport.clone(),
                    config.etag_cache_size,
                )),
                transport,
                persistence: None,
                decryptor: None,
                delegate: Arc::new(NoopFeaturesDelegate),
            },
            reconnect: Arc::new(ReconnectPolicy::new(
                config.max_retries,
                config.initial_retry_delay,
                config.max_retry_delay,
            )),
            connection: Arc::new(ConnectionStateController::new()),
            config,
            stream_task: Mutex::new(None),
            restart: tokio::sync::Mutex::new(()),
        }
    }

    /// Persist applied payloads and restore them with [`FeatureRefresher::load_cached`].
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceLayer>) -> FeatureRefresher {
        self.pipeline.persistence = Some(persistence);
        self
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn FeatureDecryptor>) -> FeatureRefresher {
        self.pipeline.decryptor = Some(decryptor);
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn FeaturesDelegate>) -> FeatureRefresher {
        self.pipeline.delegate = delegate;
        self
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn connection_state(&self) -> &Arc<ConnectionStateController> {
        &self.connection
    }

    pub fn reconnect_policy(&self) -> &Arc<ReconnectPolicy> {
        &self.reconnect
    }

    /// Apply the snapshot saved by the last successful fetch, if any.
    ///
    /// Returns `Ok(false)` if there is no snapshot.
    pub fn load_cached(&self) -> Result<bool> {
        let Some(persistence) = &self.pipeline.persistence else {
            return Ok(false);
        };
        let Some(json) = persistence.load(FEATURE_CACHE_KEY) else {
            log::debug!(target: "growthbook", "no features snapshot");
            return Ok(false);
        };
        let body = serde_json::to_vec(&json)?;
        self.pipeline.apply(&body, false)?;
        Ok(true)
    }

    /// Fetch features once.
    ///
    /// Failures are reported to the delegate and returned. There is no automatic retry.
    pub async fn refresh(&self) -> Result<()> {
        let url = self.pipeline.store.get_context().features_url()?;
        let fetcher = &self.pipeline.fetcher;

        match fetcher.fetch(&url).await {
            Ok(FetchOutcome::Fetched { body, etag }) => {
                self.pipeline.apply(&body, true)?;
                fetcher.store_etag(&url, etag.as_deref());
                Ok(())
            }
            Ok(FetchOutcome::NotModified) => Ok(()),
            Err(err) => {
                log::warn!(target: "growthbook", err:display; "failed to fetch features");
                self.pipeline.delegate.features_fetch_failed(&err, true);
                Err(err)
            }
        }
    }

    /// Start listening to the server-sent events stream in a background task.
    ///
    /// A stream started earlier is torn down first: this waits until its task has exited, so it
    /// can no longer touch the connection state or the reconnect counter. Must be called within
    /// a tokio runtime.
    pub async fn start_streaming(&self) -> Result<()> {
        let url = self.pipeline.store.get_context().stream_url()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| Error::Transport(err.to_string()))?;

        let _restart = self.restart.lock().await;
        if let Some(previous) = self.take_stream_task() {
            log::debug!(target: "growthbook", "replacing active stream");
            previous.abort();
            // Error means the task was aborted or panicked. Either way it is gone.
            let _ = previous.await;
        }

        self.connection.start();
        self.reconnect.reset();

        let stream = StreamLoop {
            pipeline: self.pipeline.clone(),
            connection: self.connection.clone(),
            reconnect: self.reconnect.clone(),
            url,
        };
        *self
            .stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(runtime.spawn(stream.run()));
        Ok(())
    }

    /// Stop the stream. A pending reconnection delay is cancelled immediately.
    pub fn stop_streaming(&self) {
        self.connection.stop();
    }

    /// Stop the stream and wait for the background task to exit.
    pub async fn shutdown(&self) {
        let _restart = self.restart.lock().await;
        self.stop_streaming();
        if let Some(task) = self.take_stream_task() {
            let _ = task.await;
        }
    }

    fn take_stream_task(&self) -> Option<JoinHandle<()>> {
        self.stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Return `true` while the streaming task is running.
    pub fn is_streaming(&self) -> bool {
        self.stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for FeatureRefresher {
    fn drop(&mut self) {
        self.connection.stop();
    }
}

struct StreamLoop {
    pipeline: Pipeline,
    connection: Arc<ConnectionStateController>,
    reconnect: Arc<ReconnectPolicy>,
    url: Url,
}

impl StreamLoop {
    async fn run(self) {
        let mut state = self.connection.subscribe();

        while self.connection.is_active() {
            match self.consume(&mut state).await {
                Ok(()) => break,
                Err(err) if err.is_fatal() => {
                    log::warn!(target: "growthbook", err:display; "stream failed permanently");
                    self.give_up(&err);
                    break;
                }
                Err(err) => {
                    log::debug!(target: "growthbook", err:display; "stream interrupted");
                }
            }

            if !self.reconnect.should_retry() {
                let err = Error::RetriesExhausted(self.reconnect.attempt());
                log::warn!(target: "growthbook", err:display; "giving up on stream");
                self.give_up(&err);
                break;
            }

            let delay = self.reconnect.next_delay();
            let attempt = self.reconnect.record_failure();
            log::debug!(target: "growthbook", attempt, delay:debug; "reconnecting to stream");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stopped(&mut state) => break,
            }
        }

        log::debug!(target: "growthbook", "stream task exited");
    }

    /// Stop for good. Restarting is the host's decision.
    fn give_up(&self, err: &Error) {
        self.connection.stop();
        self.pipeline.delegate.features_fetch_failed(err, true);
    }

    /// Read the stream until it fails. Returns `Ok` only if the connection was stopped.
    async fn consume(
        &self,
        state: &mut tokio::sync::watch::Receiver<ConnectionState>,
    ) -> Result<()> {
        log::debug!(target: "growthbook", url = self.url.as_str(); "opening stream");
        let mut stream = tokio::select! {
            stream = self.pipeline.transport.open_stream(&self.url) => stream?,
            _ = stopped(state) => return Ok(()),
        };
        self.reconnect.reset();

        let mut decoder = SseDecoder::new();
        loop {
            let chunk = tokio::select! {
                chunk = stream.next_chunk() => chunk?,
                _ = stopped(state) => return Ok(()),
            };
            match chunk {
                Some(chunk) => {
                    for event in decoder.push(&chunk) {
                        self.pipeline.handle_event(event);
                    }
                }
                None => {
                    if let Some(event) = decoder.finish() {
                        self.pipeline.handle_event(event);
                    }
                    return Err(Error::StreamClosed);
                }
            }
        }
    }
}
