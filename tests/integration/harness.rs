//! Integration test harness
//! Builds an `AuthSession` on `ReqwestHttpClient` and a file-backed store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mockito::{Server, ServerGuard};
use serde_json::{json, Value};
use tempfile::TempDir;

use tokengate_lib::{
    AuthSession, CredentialPair, CredentialStore, FileBackend, ReqwestHttpClient,
};

pub const CREDENTIALS_KEY: &str = "auth_tokens";

pub struct Harness {
    pub server: ServerGuard,
    pub session: AuthSession,
    pub store: Arc<CredentialStore>,
    pub credentials_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    /// Start a server and a session, optionally with a pair already on disk
    pub async fn start(stored: Option<CredentialPair>) -> anyhow::Result<Self> {
        let server = Server::new_async().await;
        let dir = tempfile::tempdir()?;
        let credentials_path = dir.path().join("credentials.json");

        if let Some(pair) = stored {
            std::fs::write(
                &credentials_path,
                json!({ CREDENTIALS_KEY: pair }).to_string(),
            )?;
        }

        let store = Arc::new(CredentialStore::open(
            Arc::new(FileBackend::new(&credentials_path)),
            CREDENTIALS_KEY,
        ));
        let http = ReqwestHttpClient::with_timeout(Duration::from_secs(5))?;
        let session = AuthSession::new(Arc::new(http), server.url(), Arc::clone(&store));

        Ok(Self {
            server,
            session,
            store,
            credentials_path,
            _dir: dir,
        })
    }

    /// What a fresh process would load from disk
    pub fn persisted(&self) -> Option<CredentialPair> {
        CredentialStore::open(
            Arc::new(FileBackend::new(&self.credentials_path)),
            CREDENTIALS_KEY,
        )
        .get()
    }
}

pub fn user_json() -> Value {
    json!({
        "id": "u1",
        "email": "ada@example.com",
        "name": "Ada",
        "role": "admin"
    })
}

pub fn pair_json(access: &str, refresh: &str) -> String {
    json!({"accessToken": access, "refreshToken": refresh}).to_string()
}
