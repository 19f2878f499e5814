//! Consumer-facing session operations.
//!
//! `AuthSession` wires the credential store, the request pipeline and the
//! projector together and exposes the five operations a UI layer needs.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::api::{
    AuthResponse, LoginCredentials, RegisterCredentials, User, LOGIN_PATH, LOGOUT_PATH,
    PROFILE_PATH, REFRESH_PATH, REGISTER_PATH,
};
use crate::auth::projection::{AuthProjector, AuthSnapshot};
use crate::credentials::CredentialStore;
use crate::error::{ApiError, ApiResult};
use crate::events::{
    session_events, NoticeLevel, SessionEvent, SessionEventKind, SessionEvents, Subscriber,
};
use crate::pipeline::{
    join_url, ApiClient, BearerDecorator, DefaultHeaders, RefreshCoordinator, RequestChain,
};
use crate::transport::{ApiRequest, HttpClient};

/// Reason recorded when the server gives none
fn failure_reason(error: &ApiError, fallback: &str) -> String {
    match error {
        ApiError::Unauthorized { .. } | ApiError::Http { .. } => error.message(),
        _ => fallback.to_string(),
    }
}

/// An authenticated session against one API
pub struct AuthSession {
    client: ApiClient,
    store: Arc<CredentialStore>,
    projector: Arc<AuthProjector>,
    events: SessionEvents,
}

impl AuthSession {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self::with_events(http, base_url, store, session_events())
    }

    /// Build a session publishing onto an existing event stream
    pub fn with_events(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        events: SessionEvents,
    ) -> Self {
        let base_url = base_url.into();
        let projector = Arc::new(AuthProjector::new(events.clone()));

        let coordinator = RefreshCoordinator::new(
            Arc::clone(&http),
            join_url(&base_url, REFRESH_PATH),
            Arc::clone(&store),
            Arc::clone(&projector),
            events.clone(),
        );

        let chain = RequestChain::new()
            .with_hook(Arc::new(DefaultHeaders::new()))
            .with_hook(Arc::new(BearerDecorator::new(Arc::clone(&store))));

        let client = ApiClient::new(http, base_url, chain, coordinator, events.clone());

        Self {
            client,
            store,
            projector,
            events,
        }
    }

    /// Client for application calls that should ride the same session
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn projector(&self) -> &Arc<AuthProjector> {
        &self.projector
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn subscribe(&self) -> Subscriber<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> AuthSnapshot {
        self.projector.snapshot().await
    }

    /// Exchange email and password for a session
    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<User> {
        let request = ApiRequest::post(LOGIN_PATH)
            .public()
            .with_json(credentials)
            .map_err(ApiError::decode)?;

        self.authenticate(request, "Login failed", "Login successful!")
            .await
    }

    /// Create an account and start a session for it
    pub async fn register(&self, credentials: &RegisterCredentials) -> ApiResult<User> {
        let request = ApiRequest::post(REGISTER_PATH)
            .public()
            .with_json(credentials)
            .map_err(ApiError::decode)?;

        self.authenticate(request, "Registration failed", "Registration successful!")
            .await
    }

    async fn authenticate(
        &self,
        request: ApiRequest,
        fallback: &str,
        success: &str,
    ) -> ApiResult<User> {
        self.projector.begin_authenticating().await;

        match self.client.send_json::<AuthResponse>(request).await {
            Ok(AuthResponse { user, tokens }) => {
                self.client.coordinator().begin_session(tokens).await;
                info!(user_id = %user.id, "Session started");
                self.projector.authenticated(user.clone()).await;
                self.events
                    .publish(SessionEvent::notice(NoticeLevel::Success, success))
                    .await;
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                self.projector.failed(failure_reason(&e, fallback)).await;
                Err(e)
            }
        }
    }

    /// End the session.
    ///
    /// The server call is best effort: local credentials are cleared and the
    /// state is anonymous even when it fails, in which case the failure is
    /// still returned.
    pub async fn logout(&self) -> ApiResult<()> {
        let result = self.client.send(ApiRequest::post(LOGOUT_PATH)).await;

        self.client.coordinator().end_session().await;
        self.projector.signed_out().await;
        self.events
            .publish(SessionEvent::new(SessionEventKind::SignedOut))
            .await;

        match result {
            Ok(_) => {
                info!("Logged out");
                self.events
                    .publish(SessionEvent::notice(NoticeLevel::Success, "Logout successful!"))
                    .await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Server logout failed, local session cleared anyway");
                Err(e)
            }
        }
    }

    /// Fetch the current user; any failure drops the stored credentials
    pub async fn get_profile(&self) -> ApiResult<User> {
        self.projector.begin_authenticating().await;

        match self.client.send_json::<User>(ApiRequest::get(PROFILE_PATH)).await {
            Ok(user) => {
                debug!(user_id = %user.id, "Profile loaded");
                self.projector.authenticated(user.clone()).await;
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed, clearing credentials");
                self.client.coordinator().end_session().await;
                if e.is_unauthorized() {
                    self.projector.session_expired(e.message()).await;
                } else {
                    self.projector
                        .failed(failure_reason(&e, "Failed to get user profile"))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Resume a persisted session on startup.
    ///
    /// Returns `Ok(None)` without any network call when nothing is stored.
    pub async fn restore(&self) -> ApiResult<Option<User>> {
        if !self.store.is_present() {
            debug!("No stored credentials, starting anonymous");
            return Ok(None);
        }

        info!("Stored credentials found, restoring session");
        self.get_profile().await.map(Some)
    }
}
