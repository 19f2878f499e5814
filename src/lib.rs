// Export modules
pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export the consumer-facing surface
pub use crate::auth::{
    AuthProjection, AuthProjector, AuthSession, AuthSnapshot, LoginCredentials,
    RegisterCredentials, User, UserPatch, UserRole,
};
pub use crate::config::{ApiConfig, Config, ConfigManager, StorageConfig};
pub use crate::credentials::{
    CredentialBackend, CredentialPair, CredentialStore, FileBackend, MemoryBackend,
};
pub use crate::error::{ApiError, ApiResult, ErrorCategory, ErrorCode};
pub use crate::events::{NoticeLevel, SessionEvent, SessionEventKind, SessionEvents};
pub use crate::pipeline::{ApiClient, RefreshCoordinator, RefreshError};
pub use crate::transport::{ApiRequest, HttpClient, HttpMethod, ReqwestHttpClient, SimpleHttpResponse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
