//! In-Memory Repository Implementation
//!
//! Concurrent maps for development and tests. Indivisible operations hold
//! the entry's shard lock for the whole read-check-write, so concurrent
//! callers observe the same guarantees as the PostgreSQL implementation.
//! Rotation and bulk revocation span several refresh-token entries, so they
//! also serialize on a table-wide lock.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kernel::id::{SessionId, UserId};

use crate::domain::entity::{
    blacklist_entry::BlacklistEntry,
    client::OAuthClient,
    credential::{AttemptReservation, Credential, LockoutPolicy},
    refresh_token::{ConsumeOutcome, RefreshToken, RefreshTokenRotation},
    two_factor_challenge::TwoFactorChallenge,
    user::User,
};
use crate::domain::repository::{
    AccessTokenBlacklistRepository, ClientRegistry, CredentialRepository, RefreshTokenRepository,
    TwoFactorChallengeRepository, UserRepository,
};
use crate::domain::value_object::{
    auth_policy::AuthPolicy, email::Email, totp_secret::TotpSecret,
};
use crate::error::{AuthError, AuthResult};

#[derive(Default)]
struct Tables {
    clients: DashMap<String, OAuthClient>,
    users: DashMap<UserId, User>,
    /// Normalized email -> user id; the uniqueness index
    emails: DashMap<String, UserId>,
    credentials: DashMap<UserId, Credential>,
    challenges: DashMap<String, TwoFactorChallenge>,
    refresh_tokens: DashMap<String, RefreshToken>,
    /// Held by rotation and bulk revocation
    refresh_token_writes: Mutex<()>,
    blacklist: DashMap<String, BlacklistEntry>,
}

/// Process-local auth repository. Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryAuthRepository {
    tables: Arc<Tables>,
}

impl InMemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a user's roles
    pub fn set_roles(&self, user_id: &UserId, roles: Vec<String>) -> bool {
        self.tables
            .users
            .get_mut(user_id)
            .map(|mut user| {
                user.roles = roles;
                user.updated_at = Utc::now();
            })
            .is_some()
    }

    pub fn mark_email_verified(&self, user_id: &UserId) -> bool {
        self.tables
            .users
            .get_mut(user_id)
            .map(|mut user| {
                user.email_verified = true;
                user.updated_at = Utc::now();
            })
            .is_some()
    }

    /// Number of refresh tokens of the user that could still be spent
    pub fn active_refresh_token_count(&self, user_id: &UserId) -> usize {
        let now = Utc::now();
        self.tables
            .refresh_tokens
            .iter()
            .filter(|token| token.user_id == *user_id && token.is_active(now))
            .count()
    }

    fn lock_refresh_token_writes(&self) -> AuthResult<MutexGuard<'_, ()>> {
        self.tables
            .refresh_token_writes
            .lock()
            .map_err(|_| AuthError::Internal("Refresh token lock poisoned".to_string()))
    }

    /// Number of stored refresh token records, active or not
    pub fn refresh_token_count(&self) -> usize {
        self.tables.refresh_tokens.len()
    }
}

// ============================================================================
// Client Registry Implementation
// ============================================================================

impl ClientRegistry for InMemoryAuthRepository {
    async fn find_active_client(&self, client_id: &str) -> AuthResult<Option<OAuthClient>> {
        Ok(self
            .tables
            .clients
            .get(client_id)
            .filter(|client| client.is_active)
            .map(|client| client.value().clone()))
    }

    async fn save_client(&self, client: &OAuthClient) -> AuthResult<()> {
        self.tables
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn update_auth_policy(&self, client_id: &str, policy: &AuthPolicy) -> AuthResult<bool> {
        let Some(mut client) = self.tables.clients.get_mut(client_id) else {
            return Ok(false);
        };
        if !client.is_active {
            return Ok(false);
        }

        client.properties = Some(policy.merge_into(client.properties.as_deref()));
        Ok(true)
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for InMemoryAuthRepository {
    async fn create_user(&self, user: &User, credential: &Credential) -> AuthResult<()> {
        match self.tables.emails.entry(user.email.as_str().to_string()) {
            Entry::Occupied(_) => Err(AuthError::EmailAlreadyRegistered),
            Entry::Vacant(slot) => {
                self.tables.users.insert(user.user_id, user.clone());
                self.tables
                    .credentials
                    .insert(user.user_id, credential.clone());
                slot.insert(user.user_id);
                Ok(())
            }
        }
    }

    async fn find_user_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.tables.users.get(user_id).map(|user| user.value().clone()))
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let Some(user_id) = self.tables.emails.get(email.as_str()).map(|id| *id.value()) else {
            return Ok(None);
        };
        self.find_user_by_id(&user_id).await
    }
}

// ============================================================================
// Credential Repository Implementation
// ============================================================================

impl CredentialRepository for InMemoryAuthRepository {
    async fn find_credential(&self, user_id: &UserId) -> AuthResult<Option<Credential>> {
        Ok(self
            .tables
            .credentials
            .get(user_id)
            .map(|credential| credential.value().clone()))
    }

    async fn reserve_login_attempt(
        &self,
        user_id: &UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<(Credential, AttemptReservation)>> {
        Ok(self.tables.credentials.get_mut(user_id).map(|mut credential| {
            let reservation = credential.reserve_attempt(policy, now);
            (credential.value().clone(), reservation)
        }))
    }

    async fn reset_failed_attempts(&self, user_id: &UserId, clear_lockout: bool) -> AuthResult<()> {
        if let Some(mut credential) = self.tables.credentials.get_mut(user_id) {
            credential.reset_failures(clear_lockout);
        }
        Ok(())
    }

    async fn update_totp(
        &self,
        user_id: &UserId,
        secret: Option<&TotpSecret>,
        enabled: bool,
    ) -> AuthResult<()> {
        let Some(mut credential) = self.tables.credentials.get_mut(user_id) else {
            return Err(AuthError::Internal("Credential record missing".to_string()));
        };
        credential.totp_secret = secret.cloned();
        credential.totp_enabled = enabled && secret.is_some();
        credential.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// Two-Factor Challenge Repository Implementation
// ============================================================================

impl TwoFactorChallengeRepository for InMemoryAuthRepository {
    async fn insert_challenge(&self, challenge: &TwoFactorChallenge) -> AuthResult<()> {
        self.tables
            .challenges
            .insert(challenge.token_hash.clone(), challenge.clone());
        Ok(())
    }

    async fn take_challenge(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TwoFactorChallenge>> {
        // Expired challenges are removed too; they can never be redeemed
        Ok(self
            .tables
            .challenges
            .remove(token_hash)
            .map(|(_, challenge)| challenge)
            .filter(|challenge| !challenge.is_expired(now)))
    }

    async fn prune_challenges(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let before = self.tables.challenges.len();
        self.tables
            .challenges
            .retain(|_, challenge| !challenge.is_expired(now));
        Ok(before.saturating_sub(self.tables.challenges.len()) as u64)
    }
}

// ============================================================================
// Refresh Token Repository Implementation
// ============================================================================

impl RefreshTokenRepository for InMemoryAuthRepository {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> AuthResult<()> {
        self.tables
            .refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self
            .tables
            .refresh_tokens
            .get(token_hash)
            .map(|token| token.value().clone()))
    }

    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<ConsumeOutcome> {
        let Some(mut token) = self.tables.refresh_tokens.get_mut(token_hash) else {
            return Ok(ConsumeOutcome::Invalid);
        };

        if token.user_id != *user_id {
            return Ok(ConsumeOutcome::Invalid);
        }
        if token.was_rotated() {
            return Ok(ConsumeOutcome::Reused(token.value().clone()));
        }
        if !token.is_active(now) {
            return Ok(ConsumeOutcome::Invalid);
        }

        token.revoke(now);
        Ok(ConsumeOutcome::Consumed(token.value().clone()))
    }

    async fn rotate_refresh_token(
        &self,
        user_id: &UserId,
        rotation: &RefreshTokenRotation,
    ) -> AuthResult<ConsumeOutcome> {
        // Held until the successor is stored, so a concurrent revocation
        // sees either both entries or neither
        let _writes = self.lock_refresh_token_writes()?;

        let successor = {
            let Some(mut token) = self.tables.refresh_tokens.get_mut(&rotation.presented_hash)
            else {
                return Ok(ConsumeOutcome::Invalid);
            };

            if token.user_id != *user_id || token.session_id != rotation.session_id {
                return Ok(ConsumeOutcome::Invalid);
            }
            if token.was_rotated() {
                return Ok(ConsumeOutcome::Reused(token.value().clone()));
            }
            if !token.is_active(rotation.now) {
                return Ok(ConsumeOutcome::Invalid);
            }

            token.mark_rotated(&rotation.successor_hash, rotation.now);
            token.successor(
                rotation.successor_hash.clone(),
                rotation.now,
                rotation.expires_at,
            )
        };

        // Presented entry's guard is released first: both keys may share a shard
        self.tables
            .refresh_tokens
            .insert(successor.token_hash.clone(), successor.clone());

        Ok(ConsumeOutcome::Consumed(successor))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let Some(mut token) = self.tables.refresh_tokens.get_mut(token_hash) else {
            return Ok(false);
        };
        if token.user_id != *user_id || token.revoked {
            return Ok(false);
        }
        token.revoke(now);
        Ok(true)
    }

    async fn revoke_session_tokens(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let _writes = self.lock_refresh_token_writes()?;
        let mut revoked = 0;
        for mut token in self.tables.refresh_tokens.iter_mut() {
            if token.user_id == *user_id && token.session_id == *session_id && !token.revoked {
                token.revoke(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_user_tokens(&self, user_id: &UserId, now: DateTime<Utc>) -> AuthResult<u64> {
        let _writes = self.lock_refresh_token_writes()?;
        let mut revoked = 0;
        for mut token in self.tables.refresh_tokens.iter_mut() {
            if token.user_id == *user_id && !token.revoked {
                token.revoke(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn prune_refresh_tokens(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let before = self.tables.refresh_tokens.len();
        self.tables
            .refresh_tokens
            .retain(|_, token| token.expires_at > now);
        Ok(before.saturating_sub(self.tables.refresh_tokens.len()) as u64)
    }
}

// ============================================================================
// Access Token Blacklist Repository Implementation
// ============================================================================

impl AccessTokenBlacklistRepository for InMemoryAuthRepository {
    async fn insert_blacklist_entry(&self, entry: &BlacklistEntry) -> AuthResult<()> {
        self.tables
            .blacklist
            .entry(entry.token_hash.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn is_blacklisted(&self, token_hash: &str, user_id: &UserId) -> AuthResult<bool> {
        Ok(self
            .tables
            .blacklist
            .get(token_hash)
            .is_some_and(|entry| entry.user_id == *user_id))
    }

    async fn prune_blacklist(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let before = self.tables.blacklist.len();
        self.tables.blacklist.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.tables.blacklist.len()) as u64)
    }
}
