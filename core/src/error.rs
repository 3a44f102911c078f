//! Error types for the back-office clients.
//!
//! # Design
//! `Unauthorized` gets a dedicated variant because a 401 from the application
//! API ends the session; callers still see it as a rejection. All other
//! non-2xx responses land in `Status` with the raw status and body, left for
//! each resource wrapper to interpret. Upload failures are collapsed into
//! `UploadFailure` so callers show one message regardless of cause.

use thiserror::Error;

use crate::session::SessionError;
use crate::transport::TransportError;

/// Message shown when the upload service could not be reached.
pub const UPLOAD_NETWORK_MESSAGE: &str = "Unable to connect to the upload server";

/// Message shown when an upload failed for an unrecognized reason.
pub const UPLOAD_UNKNOWN_MESSAGE: &str = "File upload failed";

/// Errors returned by `HttpClient` and the services built on it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The application API returned 401; the session has been cleared.
    #[error("HTTP 401: session expired")]
    Unauthorized { body: String },

    /// The server returned a non-2xx status other than an application 401.
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        status_text: String,
        body: String,
    },

    /// Normalized upload failure.
    #[error("{0}")]
    Upload(UploadFailure),

    /// No usable response was received from the application API.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    /// Status code for errors that carry a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body parsed as JSON, for errors that carry a response.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Unauthorized { body } | ApiError::Status { body, .. } => {
                serde_json::from_str(body).ok()
            }
            _ => None,
        }
    }
}

/// Closed set of upload failure causes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadFailure {
    /// No response was received (refused, unreachable, timed out).
    #[error("{}", UPLOAD_NETWORK_MESSAGE)]
    Network,

    /// The upload service answered with an error.
    #[error("{0}")]
    Application(String),

    #[error("{}", UPLOAD_UNKNOWN_MESSAGE)]
    Unknown,
}

impl UploadFailure {
    pub fn message(&self) -> String {
        self.to_string()
    }
}
