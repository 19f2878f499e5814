use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthSnapshot;

pub mod streams;
pub use streams::{EventKind, EventStream, EventStreamStats, Subscriber};

// Event bus capacity constant
pub const EVENT_BUS_CAPACITY: usize = 1000;
pub const EVENT_BUFFER_SIZE: usize = 100;

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// What happened in the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// The observable auth projection changed
    StateChanged { snapshot: AuthSnapshot },
    /// A refresh network call was issued
    RefreshStarted,
    /// A refresh completed and released `waiters` stalled callers
    RefreshSucceeded { waiters: usize },
    /// A refresh produced no pair, either failing or superseded by a session change
    RefreshFailed { reason: String, waiters: usize },
    /// Credentials were cleared by an explicit logout
    SignedOut,
    /// Message meant for a global notification area
    Notice { level: NoticeLevel, message: String },
}

/// Event published on the session stream
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::new(SessionEventKind::Notice {
            level,
            message: message.into(),
        })
    }
}

impl EventKind for SessionEvent {
    fn kind(&self) -> &'static str {
        match &self.kind {
            SessionEventKind::StateChanged { .. } => "state.changed",
            SessionEventKind::RefreshStarted => "refresh.started",
            SessionEventKind::RefreshSucceeded { .. } => "refresh.succeeded",
            SessionEventKind::RefreshFailed { .. } => "refresh.failed",
            SessionEventKind::SignedOut => "signed_out",
            SessionEventKind::Notice { .. } => "notice",
        }
    }
}

/// Shared handle to the session event stream
pub type SessionEvents = Arc<EventStream<SessionEvent>>;

/// Create a session event stream with the default sizes
pub fn session_events() -> SessionEvents {
    Arc::new(EventStream::new(EVENT_BUS_CAPACITY, EVENT_BUFFER_SIZE))
}
