//! Single-flight credential refresh.
//!
//! However many callers hit a 401 at once, exactly one refresh call is in
//! flight. The first caller starts it, later callers queue a waiter, and every
//! waiter receives the same outcome when the refresh resolves.
//!
//! The coordinator is also the only writer of the credential store. Logins
//! and logouts go through [`RefreshCoordinator::begin_session`] and
//! [`RefreshCoordinator::end_session`], which bump a session epoch; a refresh
//! that started under an older epoch never touches the store.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::auth::api::{decode_response, RefreshRequest};
use crate::auth::AuthProjector;
use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::ApiError;
use crate::events::{SessionEvent, SessionEventKind, SessionEvents};
use crate::transport::HttpClient;

/// Why a refresh attempt could not produce a new pair
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Refresh request failed: {reason}")]
    Network { reason: String },

    #[error("Refresh response was malformed: {reason}")]
    MalformedResponse { reason: String },

    /// A login or logout happened while the refresh was in flight
    #[error("Session changed while the refresh was in flight")]
    Superseded,

    #[error("Refresh ended without reporting an outcome")]
    Abandoned,
}

type RefreshOutcome = Result<CredentialPair, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

/// `Refreshing` owns every caller waiting on the call and the epoch it began in
enum RefreshState {
    Idle,
    Refreshing { epoch: u64, waiters: Vec<Waiter> },
}

struct SessionState {
    /// Bumped on every login and logout
    epoch: u64,
    refresh: RefreshState,
}

struct CoordinatorInner {
    http: Arc<dyn HttpClient>,
    refresh_url: String,
    store: Arc<CredentialStore>,
    projector: Arc<AuthProjector>,
    events: SessionEvents,
    state: Mutex<SessionState>,
}

/// Owner of the refresh state machine. Clones share the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RefreshCoordinator {
    pub fn new(
        http: Arc<dyn HttpClient>,
        refresh_url: impl Into<String>,
        store: Arc<CredentialStore>,
        projector: Arc<AuthProjector>,
        events: SessionEvents,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                http,
                refresh_url: refresh_url.into(),
                store,
                projector,
                events,
                state: Mutex::new(SessionState {
                    epoch: 0,
                    refresh: RefreshState::Idle,
                }),
            }),
        }
    }

    /// Resolve to a usable credential pair, refreshing at most once system-wide.
    ///
    /// The refresh runs on its own task: dropping the calling future does not
    /// cancel it, so queued waiters are always released.
    pub async fn ensure_fresh_credential(&self) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = self.inner.state.lock().await;
            let epoch = state.epoch;
            match &mut state.refresh {
                RefreshState::Refreshing { waiters, .. } => {
                    waiters.push(tx);
                    debug!(waiters = waiters.len(), "Joining in-flight refresh");
                    None
                }
                idle @ RefreshState::Idle => {
                    *idle = RefreshState::Refreshing {
                        epoch,
                        waiters: vec![tx],
                    };
                    // Read under the lock so the token belongs to `epoch`
                    let refresh_token = self
                        .inner
                        .store
                        .get()
                        .filter(CredentialPair::has_refresh_token)
                        .map(|pair| pair.refresh_token);
                    Some((epoch, refresh_token))
                }
            }
        };

        if let Some((epoch, refresh_token)) = start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_refresh(epoch, refresh_token).await });
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Whether a refresh call is currently outstanding
    pub async fn is_refreshing(&self) -> bool {
        matches!(
            self.inner.state.lock().await.refresh,
            RefreshState::Refreshing { .. }
        )
    }

    /// Install the pair from a login or registration.
    ///
    /// A refresh still in flight is superseded and will not overwrite it.
    pub(crate) async fn begin_session(&self, pair: CredentialPair) {
        let mut state = self.inner.state.lock().await;
        state.epoch += 1;
        self.inner.store.set(pair).await;
        debug!(epoch = state.epoch, "Session credentials installed");
    }

    /// Drop the stored pair for a logout or a failed profile fetch.
    ///
    /// A refresh still in flight is superseded and will not restore a pair.
    pub(crate) async fn end_session(&self) {
        let mut state = self.inner.state.lock().await;
        state.epoch += 1;
        self.inner.store.clear().await;
        debug!(epoch = state.epoch, "Session credentials dropped");
    }
}

impl CoordinatorInner {
    async fn run_refresh(&self, epoch: u64, refresh_token: Option<String>) {
        let outcome = self.perform_refresh(refresh_token).await;

        // Store and projector are final before anyone is released; callers
        // arriving after this point read the new pair directly.
        let (outcome, waiters) = {
            let mut state = self.state.lock().await;

            let outcome = if state.epoch == epoch {
                match &outcome {
                    Ok(pair) => self.store.set(pair.clone()).await,
                    Err(e) => {
                        self.store.clear().await;
                        self.projector.session_expired(e.to_string()).await;
                    }
                }
                outcome
            } else {
                info!(
                    started = epoch,
                    current = state.epoch,
                    "Session changed during refresh, discarding outcome"
                );
                Err(RefreshError::Superseded)
            };

            let waiters = match std::mem::replace(&mut state.refresh, RefreshState::Idle) {
                RefreshState::Refreshing { waiters, .. } => waiters,
                RefreshState::Idle => Vec::new(),
            };
            (outcome, waiters)
        };
        let released = waiters.len();

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        let kind = match outcome {
            Ok(_) => {
                info!(waiters = released, "Credential refresh succeeded");
                SessionEventKind::RefreshSucceeded { waiters: released }
            }
            Err(RefreshError::Superseded) => SessionEventKind::RefreshFailed {
                reason: RefreshError::Superseded.to_string(),
                waiters: released,
            },
            Err(e) => {
                warn!(error = %e, waiters = released, "Credential refresh failed, session cleared");
                SessionEventKind::RefreshFailed {
                    reason: e.to_string(),
                    waiters: released,
                }
            }
        };
        self.events.publish(SessionEvent::new(kind)).await;
    }

    async fn perform_refresh(&self, refresh_token: Option<String>) -> RefreshOutcome {
        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token stored, failing without a network call");
            return Err(RefreshError::MissingRefreshToken);
        };

        let body = serde_json::to_string(&RefreshRequest {
            refresh_token: &refresh_token,
        })
        .map_err(|e| RefreshError::MalformedResponse {
            reason: e.to_string(),
        })?;

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        self.events
            .publish(SessionEvent::new(SessionEventKind::RefreshStarted))
            .await;
        debug!(url = %self.refresh_url, "Issuing credential refresh");

        let response = self
            .http
            .post(&self.refresh_url, headers, body)
            .await
            .map_err(|e| RefreshError::Network {
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            let status = response.status();
            return Err(RefreshError::Rejected {
                status,
                message: ApiError::from_status(status, response.body()).message(),
            });
        }

        let pair: CredentialPair =
            decode_response(&response).map_err(|e| RefreshError::MalformedResponse {
                reason: e.to_string(),
            })?;

        if pair.access_token.is_empty() {
            return Err(RefreshError::MalformedResponse {
                reason: "empty access token".to_string(),
            });
        }

        Ok(pair)
    }
}
