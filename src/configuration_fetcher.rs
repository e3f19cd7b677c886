//! Conditional fetching of the features payload.
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use regex::Regex;
use url::Url;

use crate::{etag_cache::EtagCache, transport::Transport, Error, Result};

/// Outcome of a successful features request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Server returned a new payload.
    Fetched {
        body: Vec<u8>,
        /// Validator to remember once the payload has been applied.
        etag: Option<String>,
    },
    /// Server confirmed that the cached payload is current.
    NotModified,
}

/// Only responses of the features endpoint are cached.
fn is_cacheable(url: &Url) -> bool {
    static FEATURES_PATH: OnceLock<Option<Regex>> = OnceLock::new();
    FEATURES_PATH
        .get_or_init(|| Regex::new(r".*/api/features/[^/]+").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(url.as_str()))
}

/// Client of the features endpoint that sends `If-None-Match` with the last known `ETag`.
pub struct FeaturesFetcher {
    transport: Arc<dyn Transport>,
    etags: EtagCache,
}

impl FeaturesFetcher {
    pub fn new(transport: Arc<dyn Transport>, etag_cache_size: usize) -> FeaturesFetcher {
        FeaturesFetcher {
            transport,
            etags: EtagCache::new(etag_cache_size),
        }
    }

    pub fn etag_cache(&self) -> &EtagCache {
        &self.etags
    }

    pub async fn fetch(&self, url: &Url) -> Result<FetchOutcome> {
        let cacheable = is_cacheable(url);

        let mut headers = HashMap::from([("Cache-Control".to_owned(), "max-age=3600".to_owned())]);
        if cacheable {
            if let Some(etag) = self.etags.get(url.as_str()) {
                headers.insert("If-None-Match".to_owned(), etag);
            }
        }

        log::debug!(target: "growthbook", url = url.as_str(); "fetching features");
        let response = self.transport.get(url, &headers).await?;

        match response.status {
            200..=299 => {
                log::debug!(target: "growthbook", "successfully fetched features");
                let etag = cacheable
                    .then(|| response.header("etag").map(str::to_owned))
                    .flatten();
                Ok(FetchOutcome::Fetched {
                    body: response.body,
                    etag,
                })
            }
            304 => {
                log::debug!(target: "growthbook", "features not modified");
                Ok(FetchOutcome::NotModified)
            }
            401 | 403 => {
                log::warn!(target: "growthbook", "client is not authorized. Check your API key");
                Err(Error::Unauthorized)
            }
            status => {
                log::warn!(target: "growthbook", status; "received unexpected response while fetching features");
                Err(Error::UnexpectedStatus(status))
            }
        }
    }

    /// Remember `etag` for `url`. `None` forgets the previous one.
    pub fn store_etag(&self, url: &Url, etag: Option<&str>) {
        if is_cacheable(url) {
            self.etags.put(url.as_str(), etag);
        }
    }
}
