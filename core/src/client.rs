//! The parameterized HTTP client and the two configured instances.
//!
//! # Design
//! `HttpClient` holds a configuration record, a transport, and two
//! interceptor chains. Each call is split into `build_request` (pure: URL,
//! default headers, deadline, request chain) and `process_response` (pure:
//! body limit, status classification, response chain); `send` only adds the
//! transport round-trip between them. There are no retries and no
//! cancellation: each call either succeeds once or yields a rejection.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::{ClientConfig, HttpClientConfig};
use crate::error::ApiError;
use crate::http::{Body, HttpMethod, HttpRequest, HttpResponse};
use crate::interceptor::{
    BearerAuth, MultipartContentType, RequestInterceptor, ResponseInterceptor, SessionExpiry,
    UploadErrorNormalizer,
};
use crate::multipart::MultipartForm;
use crate::session::SessionManager;
use crate::transport::{ReqwestTransport, Transport, TransportError};

/// One backend, one policy.
#[derive(Clone)]
pub struct HttpClient {
    config: HttpClientConfig,
    transport: Arc<dyn Transport>,
    request_chain: Vec<Arc<dyn RequestInterceptor>>,
    response_chain: Vec<Arc<dyn ResponseInterceptor>>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("request_interceptors", &self.request_chain.len())
            .field("response_interceptors", &self.response_chain.len())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(config: HttpClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            request_chain: Vec::new(),
            response_chain: Vec::new(),
        }
    }

    pub fn with_request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_chain.push(Arc::new(interceptor));
        self
    }

    pub fn with_response_interceptor(
        mut self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> Self {
        self.response_chain.push(Arc::new(interceptor));
        self
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Absolute URL for `path`. Absolute inputs are used as-is.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Body>,
    ) -> Result<HttpRequest, ApiError> {
        if let (Some(limit), Some(body)) = (self.config.max_body_size, &body) {
            if body.len() > limit {
                return Err(TransportError::BodyTooLarge { limit }.into());
            }
        }

        let mut request = HttpRequest::new(method, self.url(path));
        request.headers = self.config.default_headers.clone();
        request.timeout = self.config.timeout;
        if matches!(body, Some(Body::Json(_))) && request.header("content-type").is_none() {
            request.set_header("content-type", "application/json");
        }
        request.body = body;

        for interceptor in &self.request_chain {
            interceptor.intercept(&mut request)?;
        }
        Ok(request)
    }

    pub fn process_response(
        &self,
        result: Result<HttpResponse, TransportError>,
    ) -> Result<HttpResponse, ApiError> {
        let outcome = match result {
            Ok(response) => self.classify(response),
            Err(error) => Err(ApiError::Transport(error)),
        };
        self.finish(outcome)
    }

    pub async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Body>,
    ) -> Result<HttpResponse, ApiError> {
        let request = match self.build_request(method, path, body) {
            Ok(request) => request,
            Err(error) => return self.finish(Err(error)),
        };

        debug!(method = method.as_str(), url = %request.url, "sending request");
        let result = self.transport.execute(request).await;
        match &result {
            Ok(response) => debug!(status = response.status, "received response"),
            Err(error) => debug!(%error, "no response"),
        }
        self.process_response(result)
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.send(HttpMethod::Get, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ApiError> {
        match Body::json(body) {
            Ok(body) => self.send(HttpMethod::Post, path, Some(body)).await,
            Err(error) => self.finish(Err(error)),
        }
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ApiError> {
        match Body::json(body) {
            Ok(body) => self.send(HttpMethod::Put, path, Some(body)).await,
            Err(error) => self.finish(Err(error)),
        }
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.send(HttpMethod::Delete, path, None).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> Result<HttpResponse, ApiError> {
        self.send(HttpMethod::Post, path, Some(Body::Multipart(form)))
            .await
    }

    fn classify(&self, response: HttpResponse) -> Result<HttpResponse, ApiError> {
        if let Some(limit) = self.config.max_body_size {
            if response.body.len() > limit {
                return Err(TransportError::BodyTooLarge { limit }.into());
            }
        }
        if response.is_success() {
            return Ok(response);
        }
        Err(ApiError::Status {
            status: response.status,
            body: response.text(),
            status_text: response.status_text,
        })
    }

    fn finish(&self, outcome: Result<HttpResponse, ApiError>) -> Result<HttpResponse, ApiError> {
        self.response_chain
            .iter()
            .fold(outcome, |outcome, interceptor| interceptor.intercept(outcome))
    }
}

/// The application and upload clients sharing one session.
#[derive(Debug, Clone)]
pub struct ApiClients {
    pub application: HttpClient,
    pub upload: HttpClient,
    pub session: SessionManager,
}

impl ApiClients {
    pub fn new(config: &ClientConfig, session: SessionManager, transport: Arc<dyn Transport>) -> Self {
        let application = HttpClient::new(config.application_http(), transport.clone())
            .with_request_interceptor(BearerAuth::new(session.clone()))
            .with_response_interceptor(SessionExpiry::new(session.clone(), &config.login_path));

        let upload = HttpClient::new(config.upload_http(), transport)
            .with_request_interceptor(MultipartContentType)
            .with_response_interceptor(UploadErrorNormalizer);

        Self {
            application,
            upload,
            session,
        }
    }

    /// Clients over a fresh reqwest transport.
    pub fn connect(config: &ClientConfig, session: SessionManager) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(config, session, Arc::new(transport)))
    }
}
