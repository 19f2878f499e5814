use std::sync::Arc;

use serde_json::{json, Value};

use crate::auth::AuthSession;
use crate::credentials::{CredentialPair, CredentialStore, MemoryBackend, DEFAULT_CREDENTIALS_KEY};
use crate::events::{NoticeLevel, SessionEvent, SessionEventKind};
use crate::transport::mock::{MockHttpClient, RecordedRequest};
use crate::transport::SimpleHttpResponse;

pub const BASE_URL: &str = "http://api.test";
pub const REFRESH_URL: &str = "http://api.test/auth/refresh";
pub const LOGIN_URL: &str = "http://api.test/auth/login";
pub const REGISTER_URL: &str = "http://api.test/auth/register";
pub const LOGOUT_URL: &str = "http://api.test/auth/logout";
pub const PROFILE_URL: &str = "http://api.test/auth/profile";
pub const ITEMS_URL: &str = "http://api.test/items";

/// A session wired to a scripted transport
pub struct TestSession {
    pub http: MockHttpClient,
    pub store: Arc<CredentialStore>,
    pub session: AuthSession,
}

impl TestSession {
    /// Build a session whose store starts out holding `initial`
    pub fn new(initial: Option<CredentialPair>) -> Self {
        let backend = match initial {
            Some(pair) => MemoryBackend::seeded(DEFAULT_CREDENTIALS_KEY, json!(pair)),
            None => MemoryBackend::new(),
        };
        let store = Arc::new(CredentialStore::open(
            Arc::new(backend),
            DEFAULT_CREDENTIALS_KEY,
        ));
        let http = MockHttpClient::new();
        let session = AuthSession::new(Arc::new(http.clone()), BASE_URL, Arc::clone(&store));

        Self {
            http,
            store,
            session,
        }
    }

    pub fn with_pair(access: &str, refresh: &str) -> Self {
        Self::new(Some(CredentialPair::new(access, refresh)))
    }

    /// Everything published so far
    pub async fn events(&self) -> Vec<SessionEvent> {
        self.session.subscribe().replay_buffer().await
    }

    pub async fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.events()
            .await
            .into_iter()
            .filter_map(|event| match event.kind {
                SessionEventKind::Notice { level, message } => Some((level, message)),
                _ => None,
            })
            .collect()
    }
}

pub fn user_json(name: &str) -> Value {
    json!({
        "id": "u1",
        "email": "ada@example.com",
        "name": name,
        "role": "user",
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

pub fn pair_json(access: &str, refresh: &str) -> String {
    json!({"accessToken": access, "refreshToken": refresh}).to_string()
}

/// 200 for `accepted`, 401 for any other bearer
pub fn accept_only(
    accepted: &'static str,
    body: Value,
) -> impl Fn(&RecordedRequest) -> anyhow::Result<SimpleHttpResponse> + Send + Sync + 'static {
    move |req| {
        if req.bearer() == Some(accepted) {
            Ok(SimpleHttpResponse::new(200, body.to_string()))
        } else {
            Ok(SimpleHttpResponse::new(
                401,
                json!({"message": "Token expired"}).to_string(),
            ))
        }
    }
}

/// Give spawned tasks a chance to reach their next await point
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
