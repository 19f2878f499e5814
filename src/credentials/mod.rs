//! Persisted access/refresh credential pair.
//!
//! The store is a plain holder: get, set, clear. It never coordinates
//! refreshes and never fails; a value that cannot be read back is treated as
//! "logged out" so startup always lands in an anonymous state.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

mod backend;

pub use backend::{CredentialBackend, FileBackend, MemoryBackend};

/// Storage key used when none is configured
pub const DEFAULT_CREDENTIALS_KEY: &str = "auth_tokens";

/// Access and refresh credentials, always replaced as a whole
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// Short-lived token attached to API calls
    pub access_token: String,
    /// Single-use token exchanged for a new pair
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

// Tokens must never end up in logs
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Process-wide holder of the current credential pair
pub struct CredentialStore {
    key: String,
    backend: Arc<dyn CredentialBackend>,
    current: RwLock<Option<CredentialPair>>,
}

impl CredentialStore {
    /// Open the store, loading whatever the backend holds under `key`
    pub fn open(backend: Arc<dyn CredentialBackend>, key: impl Into<String>) -> Self {
        let key = key.into();
        let current = Self::load_persisted(backend.as_ref(), &key);

        Self {
            key,
            backend,
            current: RwLock::new(current),
        }
    }

    /// A store with nothing persisted beyond this process
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryBackend::new()), DEFAULT_CREDENTIALS_KEY)
    }

    fn load_persisted(backend: &dyn CredentialBackend, key: &str) -> Option<CredentialPair> {
        let value = match backend.load(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key, "No persisted credentials");
                return None;
            }
            Err(e) => {
                warn!(error = %e, key, "Could not read persisted credentials, starting anonymous");
                return None;
            }
        };

        match serde_json::from_value::<CredentialPair>(value) {
            Ok(pair) => {
                info!(key, "Loaded persisted credentials");
                Some(pair)
            }
            Err(e) => {
                warn!(error = %e, key, "Discarding undecodable persisted credentials");
                None
            }
        }
    }

    /// Current pair, if any
    pub fn get(&self) -> Option<CredentialPair> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether a pair is currently held
    pub fn is_present(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Replace the pair. Readers see either the old or the new pair, never a mix.
    ///
    /// Memory is updated first; the backend write runs on the blocking pool
    /// after the guard is released.
    pub(crate) async fn set(&self, pair: CredentialPair) {
        let value = serde_json::to_value(&pair);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(pair);
        debug!(key = %self.key, "Credentials replaced");

        match value {
            Ok(value) => {
                let backend = Arc::clone(&self.backend);
                let key = self.key.clone();
                self.persist(move || backend.save(&key, value), "Credentials only stored in memory")
                    .await;
            }
            Err(e) => warn!(error = %e, "Failed to serialize credentials"),
        }
    }

    /// Forget the pair, in memory and on disk
    pub(crate) async fn clear(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let backend = Arc::clone(&self.backend);
        let key = self.key.clone();
        self.persist(move || backend.remove(&key), "Failed to remove persisted credentials")
            .await;

        if previous.is_some() {
            info!(key = %self.key, "Credentials cleared");
        }
    }

    async fn persist<F>(&self, write: F, failure: &str)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        match tokio::task::spawn_blocking(write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, key = %self.key, "{}", failure),
            Err(e) => warn!(error = %e, key = %self.key, "{}", failure),
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("key", &self.key)
            .field("present", &self.is_present())
            .finish()
    }
}
