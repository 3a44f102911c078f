//! API client and session layer for the back-office dashboard.
//!
//! # Overview
//! Every outbound call goes through one of two `HttpClient` instances: the
//! JSON application API, which carries the session's bearer token and ends
//! the session on 401, and the upload service, which carries a static
//! credential and reports every failure as one displayable message.
//!
//! # Design
//! - `HttpClient` is one parameterized client; policies live in interceptor
//!   chains, configuration in an `HttpClientConfig` record.
//! - Requests and responses are plain data (`http`); the network sits behind
//!   the `Transport` trait so tests run without sockets.
//! - `SessionManager` owns the persisted session and broadcasts
//!   `SessionEvent`s; UI layers react to `Expired` instead of the client
//!   navigating.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod multipart;
pub mod services;
pub mod session;
pub mod transport;

pub use auth::AuthService;
pub use client::{ApiClients, HttpClient};
pub use config::{BypassCredentials, ClientConfig, ConfigError, HttpClientConfig};
pub use error::{ApiError, UploadFailure};
pub use http::{Body, HttpMethod, HttpRequest, HttpResponse};
pub use multipart::MultipartForm;
pub use services::{
    CategoryService, CouponService, OrderService, ProductService, UploadService, UploadedFile,
    VariantService,
};
pub use session::{
    Capability, FileStorage, MemoryStorage, Permissions, Session, SessionError, SessionEvent,
    SessionManager, SessionStorage,
};
pub use transport::{ReqwestTransport, Transport, TransportError};
