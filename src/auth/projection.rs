//! Observable authentication state.
//!
//! The projection is derived, never authoritative: credentials live in the
//! [`CredentialStore`](crate::credentials::CredentialStore), and this state is
//! rebuilt from the outcomes of login, refresh and profile calls.

use std::fmt;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::api::{User, UserPatch};
use crate::events::{SessionEvent, SessionEventKind, SessionEvents};

/// Authentication state seen by the rest of the application
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthProjection {
    Anonymous,
    Authenticating,
    Authenticated { user: User },
    Failed { reason: String },
}

impl AuthProjection {
    fn label(&self) -> &'static str {
        match self {
            AuthProjection::Anonymous => "anonymous",
            AuthProjection::Authenticating => "authenticating",
            AuthProjection::Authenticated { .. } => "authenticated",
            AuthProjection::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for AuthProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Flattened view for consumers that only need the four fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
struct ProjectorState {
    projection: AuthProjection,
    /// Last failure message; survives the drop back to `Anonymous`
    error: Option<String>,
}

impl ProjectorState {
    fn snapshot(&self) -> AuthSnapshot {
        let (is_authenticated, user) = match &self.projection {
            AuthProjection::Authenticated { user } => (true, Some(user.clone())),
            _ => (false, None),
        };

        AuthSnapshot {
            is_authenticated,
            user,
            is_loading: self.projection == AuthProjection::Authenticating,
            error: self.error.clone(),
        }
    }
}

/// State machine behind [`AuthSnapshot`]
pub struct AuthProjector {
    state: RwLock<ProjectorState>,
    events: SessionEvents,
}

impl AuthProjector {
    pub fn new(events: SessionEvents) -> Self {
        Self {
            state: RwLock::new(ProjectorState {
                projection: AuthProjection::Anonymous,
                error: None,
            }),
            events,
        }
    }

    pub async fn projection(&self) -> AuthProjection {
        self.state.read().await.projection.clone()
    }

    pub async fn snapshot(&self) -> AuthSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(
            self.state.read().await.projection,
            AuthProjection::Authenticated { .. }
        )
    }

    /// A login, registration or profile fetch was submitted
    pub(crate) async fn begin_authenticating(&self) {
        self.transition(AuthProjection::Authenticating, None).await;
    }

    /// Credentials are stored and the user is known
    pub(crate) async fn authenticated(&self, user: User) {
        self.transition(AuthProjection::Authenticated { user }, None)
            .await;
    }

    /// Login, registration or profile fetch was rejected
    pub(crate) async fn failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.transition(
            AuthProjection::Failed {
                reason: reason.clone(),
            },
            Some(reason),
        )
        .await;
    }

    /// Explicit logout
    pub(crate) async fn signed_out(&self) {
        self.transition(AuthProjection::Anonymous, None).await;
    }

    /// The session can no longer be refreshed
    pub(crate) async fn session_expired(&self, reason: impl Into<String>) {
        self.transition(AuthProjection::Anonymous, Some(reason.into()))
            .await;
    }

    /// Drop the last error message without touching the state
    pub async fn clear_error(&self) {
        let snapshot = {
            let mut state = self.state.write().await;
            if state.error.is_none() {
                return;
            }
            state.error = None;
            if let AuthProjection::Failed { .. } = state.projection {
                state.projection = AuthProjection::Anonymous;
            }
            state.snapshot()
        };
        self.publish(snapshot).await;
    }

    /// Merge a partial update into the current user; no-op when signed out
    pub async fn update_user(&self, patch: UserPatch) {
        let snapshot = {
            let mut state = self.state.write().await;
            match &mut state.projection {
                AuthProjection::Authenticated { user } => user.apply(patch),
                other => {
                    debug!(state = %other, "Ignoring user update while not authenticated");
                    return;
                }
            }
            state.snapshot()
        };
        self.publish(snapshot).await;
    }

    async fn transition(&self, next: AuthProjection, error: Option<String>) {
        let snapshot = {
            let mut state = self.state.write().await;
            let previous = state.projection.label();
            state.projection = next;
            state.error = error;
            info!(from = previous, to = %state.projection, "Auth state changed");
            state.snapshot()
        };
        self.publish(snapshot).await;
    }

    async fn publish(&self, snapshot: AuthSnapshot) {
        self.events
            .publish(SessionEvent::new(SessionEventKind::StateChanged { snapshot }))
            .await;
    }
}
