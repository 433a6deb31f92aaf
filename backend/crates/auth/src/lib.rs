//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository and collaborator traits
//! - `application/` - Use cases and the token stores they share
//! - `infra/` - PostgreSQL and in-memory repositories, JWT signer
//! - `presentation/` - HTTP handlers, DTOs, router, bearer middleware
//!
//! ## Features
//! - Registration and login with email + password under per-client policies
//! - TOTP-based 2FA (Google Authenticator compatible) with one-shot challenges
//! - Short-lived JWT access tokens, rotating refresh tokens grouped by session
//! - Access-token blacklist for logout and refresh
//!
//! ## Security Model
//! - Passwords hashed with Argon2id
//! - Refresh, challenge and blacklist tokens stored only as keyed digests
//! - Automatic lockout after repeated failed logins
//! - Replay of a rotated refresh token revokes the user's sessions

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::prune::PruneExpiredUseCase;
pub use error::{AuthError, AuthResult};
pub use infra::{InMemoryAuthRepository, JwtAccessTokenSigner, PgAuthRepository};
pub use presentation::router::{auth_router, auth_router_generic};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}
