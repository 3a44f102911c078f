//! The authenticated session and where it lives.
//!
//! # Design
//! A `Session` is persisted as four independent string entries (`permissions`,
//! `role`, `userId`, `token`) in a `SessionStorage`. They are written together
//! on login and removed together on logout or expiry. `SessionManager` is the
//! only owner of that storage; clients hold a clone of it rather than reaching
//! into ambient state. Session changes are broadcast as `SessionEvent`s so a
//! UI layer can navigate without the transport knowing how.
//!
//! Storage access is not coordinated across requests. A request may read the
//! token while a 401 from another request clears it; both paths end logged
//! out.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

pub const PERMISSIONS_KEY: &str = "permissions";
pub const ROLE_KEY: &str = "role";
pub const USER_ID_KEY: &str = "userId";
pub const TOKEN_KEY: &str = "token";

/// Every key a session occupies in storage.
pub const SESSION_KEYS: [&str; 4] = [PERMISSIONS_KEY, ROLE_KEY, USER_ID_KEY, TOKEN_KEY];

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session storage is corrupt: {0}")]
    Corrupt(String),

    #[error("session storage lock poisoned")]
    Poisoned,
}

/// Back-office capabilities used to gate pages and menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    ProductManagement,
    OrderManagement,
    CategoryManagement,
    CouponManagement,
    InventoryManagement,
    MarketingManagement,
    UserManagement,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::ProductManagement,
        Capability::OrderManagement,
        Capability::CategoryManagement,
        Capability::CouponManagement,
        Capability::InventoryManagement,
        Capability::MarketingManagement,
        Capability::UserManagement,
    ];

    /// Name used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ProductManagement => "productManagement",
            Capability::OrderManagement => "orderManagement",
            Capability::CategoryManagement => "categoryManagement",
            Capability::CouponManagement => "couponManagement",
            Capability::InventoryManagement => "inventoryManagement",
            Capability::MarketingManagement => "marketingManagement",
            Capability::UserManagement => "userManagement",
        }
    }
}

/// Capability name to granted flag. Unknown names are kept as-is.
///
/// Only for deciding what to show; the backend enforces access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, bool>);

impl Permissions {
    pub fn all() -> Self {
        Self(
            Capability::ALL
                .iter()
                .map(|c| (c.as_str().to_string(), true))
                .collect(),
        )
    }

    pub fn grant(mut self, capability: Capability) -> Self {
        self.0.insert(capability.as_str().to_string(), true);
        self
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.0.get(capability.as_str()).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An authenticated principal's credential and permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: String,
}

// Backends disagree on whether user ids are numbers or strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// String key/value storage backing the session.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    /// Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, SessionError> {
        self.entries.lock().map_err(|_| SessionError::Poisoned)
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Storage persisted as a flat JSON object in a file.
///
/// A missing file reads as empty. Every write replaces the whole file through
/// a sibling temp file, so readers see either the old or the new contents.
/// A file that does not parse is treated as empty and overwritten by the next
/// write.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Entries on disk, and whether the file held valid JSON.
    fn load(&self) -> Result<(BTreeMap<String, String>, bool), SessionError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((BTreeMap::new(), true))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok((BTreeMap::new(), true));
        }
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok((entries, true)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable session file");
                Ok((BTreeMap::new(), false))
            }
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let json =
            serde_json::to_vec_pretty(entries).map_err(|e| SessionError::Corrupt(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.guard.lock().map_err(|_| SessionError::Poisoned)?;
        let (mut entries, _) = self.load()?;
        Ok(entries.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.guard.lock().map_err(|_| SessionError::Poisoned)?;
        let (mut entries, _) = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.guard.lock().map_err(|_| SessionError::Poisoned)?;
        let (mut entries, intact) = self.load()?;
        if entries.remove(key).is_some() || !intact {
            self.store(&entries)?;
        }
        Ok(())
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    LoggedOut,
    /// The backend rejected the session; the UI should navigate to `redirect_to`.
    Expired { redirect_to: String },
}

/// Single owner of the persisted session.
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { storage, events }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The stored bearer token. Read before every application request.
    pub fn token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.storage.get(TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    /// The stored session, or `None` when no token is stored.
    pub fn get(&self) -> Result<Option<Session>, SessionError> {
        let Some(token) = self.token()? else {
            return Ok(None);
        };
        let permissions = match self.storage.get(PERMISSIONS_KEY)? {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| SessionError::Corrupt(e.to_string()))?
            }
            None => Permissions::default(),
        };
        Ok(Some(Session {
            token,
            role: self.storage.get(ROLE_KEY)?.unwrap_or_default(),
            permissions,
            user_id: self.storage.get(USER_ID_KEY)?.unwrap_or_default(),
        }))
    }

    pub fn set(&self, session: &Session) -> Result<(), SessionError> {
        let permissions = serde_json::to_string(&session.permissions)
            .map_err(|e| SessionError::Corrupt(e.to_string()))?;
        self.storage.set(PERMISSIONS_KEY, &permissions)?;
        self.storage.set(ROLE_KEY, &session.role)?;
        self.storage.set(USER_ID_KEY, &session.user_id)?;
        self.storage.set(TOKEN_KEY, &session.token)?;
        self.emit(SessionEvent::LoggedIn {
            user_id: session.user_id.clone(),
        });
        Ok(())
    }

    /// Remove every session entry. Safe to call when already cleared.
    ///
    /// Every key is attempted even if one removal fails; the first failure is
    /// returned afterwards.
    pub fn clear(&self) -> Result<(), SessionError> {
        let mut first_error = None;
        for key in SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to remove session entry");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Explicit logout.
    pub fn logout(&self) -> Result<(), SessionError> {
        self.clear()?;
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Clear the session after the backend rejected it and announce the expiry.
    pub fn expire(&self, redirect_to: &str) -> Result<(), SessionError> {
        let cleared = self.clear();
        self.emit(SessionEvent::Expired {
            redirect_to: redirect_to.to_string(),
        });
        cleared
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
