//! Repository Traits
//!
//! Interfaces for data persistence. Implementations are in the
//! infrastructure layer. Every operation that must be indivisible under
//! concurrent callers (challenge take, refresh-token consume/rotate, failure
//! reservation, policy merge) is a single trait method so the backing store can
//! enforce it with its own transaction or conditional-write primitive.

use chrono::{DateTime, Utc};
use kernel::id::{SessionId, UserId};

use crate::domain::entity::{
    blacklist_entry::BlacklistEntry,
    client::OAuthClient,
    credential::{AttemptReservation, Credential, LockoutPolicy},
    refresh_token::{ConsumeOutcome, RefreshToken, RefreshTokenRotation},
    two_factor_challenge::TwoFactorChallenge,
    user::User,
};
use crate::domain::value_object::{
    auth_policy::AuthPolicy, email::Email, totp_secret::TotpSecret,
};
use crate::error::AuthResult;

/// OAuth client registry
#[trait_variant::make(ClientRegistry: Send)]
pub trait LocalClientRegistry {
    /// Find a client by id; inactive clients are not returned
    async fn find_active_client(&self, client_id: &str) -> AuthResult<Option<OAuthClient>>;

    /// Insert or replace a client
    async fn save_client(&self, client: &OAuthClient) -> AuthResult<()>;

    /// Merge `policy` into the client's properties blob in one step.
    /// Returns false if no active client has this id.
    async fn update_auth_policy(&self, client_id: &str, policy: &AuthPolicy) -> AuthResult<bool>;
}

/// User repository trait
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Create a user together with its credential.
    /// Fails with `EmailAlreadyRegistered` on a duplicate email.
    async fn create_user(&self, user: &User, credential: &Credential) -> AuthResult<()>;

    async fn find_user_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>>;
}

/// Credential repository trait
#[trait_variant::make(CredentialRepository: Send)]
pub trait LocalCredentialRepository {
    async fn find_credential(&self, user_id: &UserId) -> AuthResult<Option<Credential>>;

    /// Count a password attempt as failed before the password is checked,
    /// locking the account at the threshold. Refused while locked.
    /// Concurrent callers never get more than the threshold granted.
    async fn reserve_login_attempt(
        &self,
        user_id: &UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<(Credential, AttemptReservation)>>;

    /// Clear the failure counter; the lockout too when `clear_lockout`
    async fn reset_failed_attempts(&self, user_id: &UserId, clear_lockout: bool) -> AuthResult<()>;

    async fn update_totp(
        &self,
        user_id: &UserId,
        secret: Option<&TotpSecret>,
        enabled: bool,
    ) -> AuthResult<()>;
}

/// Two-factor challenge repository trait
#[trait_variant::make(TwoFactorChallengeRepository: Send)]
pub trait LocalTwoFactorChallengeRepository {
    async fn insert_challenge(&self, challenge: &TwoFactorChallenge) -> AuthResult<()>;

    /// Delete and return an unexpired challenge in one indivisible step.
    /// Concurrent takes of the same digest yield at most one `Some`.
    async fn take_challenge(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TwoFactorChallenge>>;

    async fn prune_challenges(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

/// Refresh token repository trait
#[trait_variant::make(RefreshTokenRepository: Send)]
pub trait LocalRefreshTokenRepository {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> AuthResult<()>;

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Spend an active token owned by `user_id`.
    /// Concurrent consumes of the same digest yield at most one `Consumed`.
    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<ConsumeOutcome>;

    /// Spend the presented token and store its successor in the same
    /// session, as one unit. `Consumed` carries the stored successor.
    async fn rotate_refresh_token(
        &self,
        user_id: &UserId,
        rotation: &RefreshTokenRotation,
    ) -> AuthResult<ConsumeOutcome>;

    /// Revoke one token; returns whether an active token was revoked
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<bool>;

    async fn revoke_session_tokens(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<u64>;

    async fn revoke_user_tokens(&self, user_id: &UserId, now: DateTime<Utc>) -> AuthResult<u64>;

    /// Delete records past their expiry
    async fn prune_refresh_tokens(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

/// Access token blacklist repository trait
#[trait_variant::make(AccessTokenBlacklistRepository: Send)]
pub trait LocalAccessTokenBlacklistRepository {
    /// Idempotent insert
    async fn insert_blacklist_entry(&self, entry: &BlacklistEntry) -> AuthResult<()>;

    async fn is_blacklisted(&self, token_hash: &str, user_id: &UserId) -> AuthResult<bool>;

    async fn prune_blacklist(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}
