use std::sync::Arc;

/// Represents a result type for fallible operations of the live update pipeline.
///
/// Feature and experiment evaluation never return this type: they always resolve to a defined
/// [`FeatureResult`](crate::FeatureResult) or [`ExperimentResult`](crate::ExperimentResult).
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while fetching, decoding, streaming, or
/// persisting feature definitions.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Fetched or cached payload has an unexpected shape.
    #[error("failed to decode features payload")]
    Decode(#[source] Arc<serde_json::Error>),

    /// Encrypted payload could not be decrypted by the configured decryptor.
    #[error("failed to decrypt features payload: {0}")]
    Decryption(String),

    /// Payload carries encrypted features but no decryptor is configured.
    #[error("payload is encrypted but no decryptor is configured")]
    MissingDecryptor,

    /// Invalid host URL configuration.
    #[error("invalid host_url configuration")]
    InvalidHostUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// Server responded with a status that is neither 2xx nor 304.
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(u16),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Transport collaborator failed for a reason other than a `reqwest` error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Stream was closed by the server.
    #[error("event stream closed")]
    StreamClosed,

    /// Stream reconnection gave up after the configured number of attempts.
    #[error("stream reconnection retries exhausted after {0} attempts")]
    RetriesExhausted(u32),

    /// Persistence collaborator failed to store a value.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Return `true` if retrying the same request cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized | Error::InvalidHostUrl(_) | Error::MissingDecryptor
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Error::InvalidHostUrl(value)
    }
}
