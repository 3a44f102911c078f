//! Client configuration, resolved once at startup.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Fixed deadline for upload requests.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// The built-in credential pair that logs in without asking the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassCredentials {
    pub email: String,
    pub password: String,
}

impl BypassCredentials {
    pub fn matches(&self, email: &str, password: &str) -> bool {
        self.email == email && self.password == password
    }
}

/// Process-wide settings for both back-office backends.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub application_base_url: String,
    pub upload_base_url: String,
    /// Pre-shared credential sent with every upload, unrelated to the session.
    pub upload_auth_token: String,
    /// Where the UI should go once the session expires.
    pub login_path: String,
    pub bypass: Option<BypassCredentials>,
}

impl ClientConfig {
    pub fn new(
        application_base_url: impl Into<String>,
        upload_base_url: impl Into<String>,
        upload_auth_token: impl Into<String>,
    ) -> Self {
        Self {
            application_base_url: application_base_url.into(),
            upload_base_url: upload_base_url.into(),
            upload_auth_token: upload_auth_token.into(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            bypass: None,
        }
    }

    pub fn with_bypass(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.bypass = Some(BypassCredentials {
            email: email.into(),
            password: password.into(),
        });
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let application_base_url = required_env("BACKOFFICE_API_URL")?;
        let upload_base_url = required_env("BACKOFFICE_UPLOAD_URL")?;
        let upload_auth_token = required_env("BACKOFFICE_UPLOAD_TOKEN")?;
        let login_path = optional_env("BACKOFFICE_LOGIN_PATH")
            .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string());

        let bypass = match (
            optional_env("BACKOFFICE_BYPASS_EMAIL"),
            optional_env("BACKOFFICE_BYPASS_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BypassCredentials { email, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "BACKOFFICE_BYPASS_EMAIL",
                    "BACKOFFICE_BYPASS_PASSWORD",
                ))
            }
        };

        Ok(Self {
            application_base_url,
            upload_base_url,
            upload_auth_token,
            login_path,
            bypass,
        })
    }

    /// JSON API: JSON content type, no deadline, unbounded bodies.
    pub fn application_http(&self) -> HttpClientConfig {
        HttpClientConfig::new(&self.application_base_url)
            .default_header("content-type", "application/json")
    }

    /// Upload service: static credential, 30 s deadline, unbounded bodies.
    pub fn upload_http(&self) -> HttpClientConfig {
        HttpClientConfig::new(&self.upload_base_url)
            .default_header("accept", "*/*")
            .default_header("authorization", &self.upload_auth_token)
            .timeout(UPLOAD_TIMEOUT)
    }
}

/// Configuration record for one `HttpClient` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub default_headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// `None` leaves request and response bodies unbounded.
    pub max_body_size: Option<usize>,
}

impl HttpClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers: Vec::new(),
            timeout: None,
            max_body_size: None,
        }
    }

    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.default_headers
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = Some(limit);
        self
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
