//! The I/O seam between `HttpClient` and the network.
//!
//! # Design
//! `Transport` executes one `HttpRequest` and returns the `HttpResponse` as
//! data, whatever its status. Failures where no response arrived are
//! classified here into the closed `TransportError` set, so code above this
//! layer never inspects HTTP-library error internals. Tests swap in scripted
//! transports; production uses `ReqwestTransport`.

use async_trait::async_trait;
use hyper::ext::ReasonPhrase;
use thiserror::Error;

use crate::http::{canonical_reason, HttpMethod, HttpRequest, HttpResponse};

/// Why a request produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server could not be reached (refused, DNS, reset).
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// A request or response body exceeded the configured limit.
    #[error("body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("unknown transport failure: {0}")]
    Unknown(String),
}

/// Executes requests. Non-2xx statuses are responses, not errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
///
/// The client keeps no cookie store, so no ambient credentials are attached
/// to cross-origin requests.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Unknown(e.to_string()))?;
        Ok(Self { client })
    }

}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body.into_bytes());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let status_text = reason_phrase(
            status.as_u16(),
            response.extensions().get::<ReasonPhrase>(),
        );
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body: body.to_vec(),
        })
    }
}

// hyper records the phrase only when it differs from the canonical one.
fn reason_phrase(status: u16, sent: Option<&ReasonPhrase>) -> String {
    sent.and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
        .map(str::to_string)
        .unwrap_or_else(|| canonical_reason(status).to_string())
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() || error.is_request() {
        TransportError::Network(error.to_string())
    } else {
        TransportError::Unknown(error.to_string())
    }
}
