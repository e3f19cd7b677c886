use std::time::Duration;

/// Configuration for [`FeatureRefresher`](crate::FeatureRefresher).
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Number of consecutive stream failures after which the refresher stops reconnecting.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_MAX_RETRIES`].
    pub max_retries: u32,
    /// Delay before the first reconnection attempt. Doubles after each failure.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_INITIAL_RETRY_DELAY`].
    pub initial_retry_delay: Duration,
    /// Upper bound of the reconnection delay.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_MAX_RETRY_DELAY`].
    pub max_retry_delay: Duration,
    /// Number of ETags remembered for conditional requests.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_ETAG_CACHE_SIZE`].
    pub etag_cache_size: usize,
}

impl RefreshConfig {
    /// Default value for [`RefreshConfig::max_retries`].
    pub const DEFAULT_MAX_RETRIES: u32 = 10;
    /// Default value for [`RefreshConfig::initial_retry_delay`].
    pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
    /// Default value for [`RefreshConfig::max_retry_delay`].
    pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
    /// Default value for [`RefreshConfig::etag_cache_size`].
    pub const DEFAULT_ETAG_CACHE_SIZE: usize = 100;

    /// Create a new `RefreshConfig` using default configuration.
    pub fn new() -> RefreshConfig {
        RefreshConfig::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> RefreshConfig {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_retry_delay(mut self, delay: Duration) -> RefreshConfig {
        self.initial_retry_delay = delay;
        self
    }

    pub fn with_max_retry_delay(mut self, delay: Duration) -> RefreshConfig {
        self.max_retry_delay = delay;
        self
    }

    pub fn with_etag_cache_size(mut self, size: usize) -> RefreshConfig {
        self.etag_cache_size = size;
        self
    }
}

impl Default for RefreshConfig {
    fn default() -> RefreshConfig {
        RefreshConfig {
            max_retries: RefreshConfig::DEFAULT_MAX_RETRIES,
            initial_retry_delay: RefreshConfig::DEFAULT_INITIAL_RETRY_DELAY,
            max_retry_delay: RefreshConfig::DEFAULT_MAX_RETRY_DELAY,
            etag_cache_size: RefreshConfig::DEFAULT_ETAG_CACHE_SIZE,
        }
    }
}
