//! Authentication: wire types, observable state and session operations.

pub mod api;
pub mod projection;
pub mod session;

pub use api::{
    AuthResponse, LoginCredentials, RegisterCredentials, User, UserPatch, UserRole,
};
pub use projection::{AuthProjection, AuthProjector, AuthSnapshot};
pub use session::AuthSession;
