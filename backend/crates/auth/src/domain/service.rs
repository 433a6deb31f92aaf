//! Collaborator Contracts
//!
//! The identity store and the access-token signer the engine consumes.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use kernel::id::{SessionId, UserId};
use platform::password::ClearTextPassword;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::{credential::LockoutPolicy, user::User};
use crate::domain::value_object::email::Email;
use crate::error::AuthResult;

/// Result of checking a password against the identity store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Succeeded { requires_two_factor: bool },
    Failed,
    /// Locked before the password was looked at
    LockedOut { retry_after: Duration },
}

/// Identity / credential store
#[trait_variant::make(IdentityStore: Send)]
pub trait LocalIdentityStore {
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    /// Check a password, applying lockout bookkeeping
    async fn check_password(&self, user: &User, password: &str) -> AuthResult<PasswordCheck>;

    /// Pay the cost of a password check when there is no account to check
    fn check_unknown_user_password(&self, password: &str);

    async fn two_factor_enabled(&self, user: &User) -> AuthResult<bool>;

    async fn verify_totp(&self, user: &User, code: &str) -> AuthResult<bool>;

    /// Hash and persist a new account
    async fn create_user(&self, email: Email, password: &ClearTextPassword) -> AuthResult<User>;

    fn lockout_policy(&self) -> LockoutPolicy;
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User id
    pub sub: Uuid,
    pub roles: Vec<String>,
    pub client_id: String,
    /// Session id shared with the refresh-token family
    pub sid: Uuid,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl AccessTokenClaims {
    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(self.sub)
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::from_uuid(self.sid)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Signed token and the claims inside it
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}

/// External token signer
pub trait AccessTokenSigner: Send + Sync {
    fn issue_access_token(
        &self,
        user: &User,
        client_id: &str,
        session_id: SessionId,
    ) -> AuthResult<IssuedAccessToken>;

    /// Verify the signature and issuer; expiry only when `validate_expiry`.
    /// Any failure is `InvalidToken`.
    fn decode_access_token(&self, token: &str, validate_expiry: bool)
    -> AuthResult<AccessTokenClaims>;
}
