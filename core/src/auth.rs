//! Login and logout.
//!
//! A session is created either from the configured bypass credential pair
//! (no backend round-trip) or from the backend's `/auth/login` answer.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::client::{ApiClients, HttpClient};
use crate::config::BypassCredentials;
use crate::error::ApiError;
use crate::session::{Permissions, Session, SessionManager};

pub const BYPASS_ROLE: &str = "admin";
pub const BYPASS_USER_ID: &str = "admin";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    client: HttpClient,
    session: SessionManager,
    bypass: Option<BypassCredentials>,
}

impl AuthService {
    pub fn new(clients: &ApiClients, bypass: Option<BypassCredentials>) -> Self {
        Self {
            client: clients.application.clone(),
            session: clients.session.clone(),
            bypass,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let session = match &self.bypass {
            Some(bypass) if bypass.matches(email, password) => Session {
                token: format!("local-{}", Uuid::new_v4()),
                role: BYPASS_ROLE.to_string(),
                permissions: Permissions::all(),
                user_id: BYPASS_USER_ID.to_string(),
            },
            _ => {
                self.client
                    .post("/auth/login", &LoginRequest { email, password })
                    .await?
                    .json::<Session>()?
            }
        };

        self.session.set(&session)?;
        info!(user_id = %session.user_id, role = %session.role, "logged in");
        Ok(session)
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.logout()?;
        info!("logged out");
        Ok(())
    }

    pub fn current(&self) -> Result<Option<Session>, ApiError> {
        Ok(self.session.get()?)
    }
}
