//! Network boundary of the live update pipeline.
use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, StatusCode};
use url::Url;

use crate::{Error, Result};

/// Response to a one-shot request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Body of an open streaming response.
#[async_trait]
pub trait EventStream: Send {
    /// Return the next chunk of the body, or `None` once the server closed the stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// HTTP client used to fetch and stream feature definitions.
///
/// Implementations report connectivity failures as errors. Non-2xx statuses of one-shot requests
/// are returned as regular responses, while `open_stream` fails unless the server accepts the
/// stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, headers: &HashMap<String, String>) -> Result<HttpResponse>;

    async fn open_stream(&self, url: &Url) -> Result<Box<dyn EventStream>>;

    async fn post(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ReqwestTransport {
        ReqwestTransport::default()
    }

    pub fn with_client(client: reqwest::Client) -> ReqwestTransport {
        ReqwestTransport { client }
    }
}

async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), value.to_owned()))
        })
        .collect();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: &HashMap<String, String>) -> Result<HttpResponse> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        into_response(request.send().await?).await
    }

    async fn open_stream(&self, url: &Url) -> Result<Box<dyn EventStream>> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Box::new(ReqwestEventStream { response })),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
            status => Err(Error::UnexpectedStatus(status.as_u16())),
        }
    }

    async fn post(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse> {
        let response = self.client.post(url.clone()).json(body).send().await?;
        into_response(response).await
    }
}

struct ReqwestEventStream {
    response: reqwest::Response,
}

#[async_trait]
impl EventStream for ReqwestEventStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.response.chunk().await?.map(|chunk| chunk.to_vec()))
    }
}
