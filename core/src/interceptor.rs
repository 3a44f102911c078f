//! Request and response policies applied by `HttpClient`.
//!
//! # Design
//! Each client owns an ordered chain of request interceptors (run after
//! default headers are applied, before the transport) and response
//! interceptors (run on the classified outcome). The application client
//! chains `BearerAuth` + `SessionExpiry`; the upload client chains
//! `MultipartContentType` + `UploadErrorNormalizer`.

use tracing::{debug, warn};

use crate::error::{ApiError, UploadFailure};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::SessionManager;
use crate::transport::TransportError;

pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut HttpRequest) -> Result<(), ApiError>;
}

pub trait ResponseInterceptor: Send + Sync {
    fn intercept(&self, outcome: Result<HttpResponse, ApiError>) -> Result<HttpResponse, ApiError>;
}

/// Attaches the session's bearer token when one is stored.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    session: SessionManager,
}

impl BearerAuth {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }
}

impl RequestInterceptor for BearerAuth {
    fn intercept(&self, request: &mut HttpRequest) -> Result<(), ApiError> {
        if let Some(token) = self.session.token()? {
            request.set_header("authorization", format!("Bearer {token}"));
        }
        Ok(())
    }
}

/// Forces the multipart content type (with boundary) on multipart bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartContentType;

impl RequestInterceptor for MultipartContentType {
    fn intercept(&self, request: &mut HttpRequest) -> Result<(), ApiError> {
        if let Some(crate::http::Body::Multipart(form)) = &request.body {
            let content_type = form.content_type();
            request.set_header("content-type", content_type);
        }
        Ok(())
    }
}

/// Ends the session when the application API answers 401.
///
/// The caller still receives `ApiError::Unauthorized`; clearing storage and
/// announcing the expiry happen first.
#[derive(Debug, Clone)]
pub struct SessionExpiry {
    session: SessionManager,
    login_path: String,
}

impl SessionExpiry {
    pub fn new(session: SessionManager, login_path: impl Into<String>) -> Self {
        Self {
            session,
            login_path: login_path.into(),
        }
    }
}

impl ResponseInterceptor for SessionExpiry {
    fn intercept(&self, outcome: Result<HttpResponse, ApiError>) -> Result<HttpResponse, ApiError> {
        match outcome {
            Err(ApiError::Status {
                status: 401, body, ..
            }) => {
                warn!(redirect_to = %self.login_path, "session rejected by backend, clearing");
                if let Err(e) = self.session.expire(&self.login_path) {
                    warn!(error = %e, "failed to clear session storage");
                }
                Err(ApiError::Unauthorized { body })
            }
            other => other,
        }
    }
}

/// Collapses every upload failure into one displayable `UploadFailure`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadErrorNormalizer;

impl ResponseInterceptor for UploadErrorNormalizer {
    fn intercept(&self, outcome: Result<HttpResponse, ApiError>) -> Result<HttpResponse, ApiError> {
        let error = match outcome {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };
        let failure = classify_upload_failure(error);
        debug!(message = %failure, "upload failed");
        Err(ApiError::Upload(failure))
    }
}

fn classify_upload_failure(error: ApiError) -> UploadFailure {
    match error {
        ApiError::Transport(TransportError::Network(_) | TransportError::Timeout) => {
            UploadFailure::Network
        }
        ApiError::Status {
            status_text, body, ..
        } => application_message(&body, &status_text)
            .map(UploadFailure::Application)
            .unwrap_or(UploadFailure::Unknown),
        ApiError::Unauthorized { body } => application_message(&body, "Unauthorized")
            .map(UploadFailure::Application)
            .unwrap_or(UploadFailure::Unknown),
        ApiError::Upload(failure) => failure,
        _ => UploadFailure::Unknown,
    }
}

/// The body's `error` string, else the status text.
fn application_message(body: &str, status_text: &str) -> Option<String> {
    let structured = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|e| e.as_str())
                .filter(|e| !e.is_empty())
                .map(str::to_string)
        });
    structured.or_else(|| (!status_text.is_empty()).then(|| status_text.to_string()))
}
