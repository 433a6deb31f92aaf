//! Domain Layer
//!
//! Contains entities, value objects, repository traits and collaborator
//! contracts.

pub mod entity;
pub mod repository;
pub mod service;
pub mod value_object;

// Re-exports
pub use entity::{client::OAuthClient, credential::Credential, user::User};
pub use repository::{
    AccessTokenBlacklistRepository, ClientRegistry, CredentialRepository, RefreshTokenRepository,
    TwoFactorChallengeRepository, UserRepository,
};
pub use service::{AccessTokenSigner, IdentityStore, PasswordCheck};
pub use value_object::auth_policy::{AuthPolicy, PolicyViolation};
