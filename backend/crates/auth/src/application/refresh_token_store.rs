//! Refresh Token Store
//!
//! Issues, consumes, rotates and revokes refresh tokens. Plaintext tokens
//! are returned to the caller once and never stored or logged; the store
//! keeps an HMAC-SHA256 digest keyed with the token pepper.
//!
//! Replaying a token that was already rotated is treated as theft: it fails
//! like any invalid token and, when configured, revokes every refresh token
//! of the user.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::{SessionId, UserId};
use platform::crypto::{random_token, token_digest};

use crate::application::config::AuthConfig;
use crate::application::store_call::{bounded, expires_after};
use crate::domain::entity::refresh_token::{ConsumeOutcome, RefreshToken, RefreshTokenRotation};
use crate::domain::repository::RefreshTokenRepository;
use crate::error::{AuthError, AuthResult};

/// Entropy of a refresh token (256 bits)
const REFRESH_TOKEN_BYTES: usize = 32;

/// Freshly issued refresh token. The plaintext exists only here.
#[derive(Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub session_id: SessionId,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedRefreshToken")
            .field("token", &"[REDACTED]")
            .field("session_id", &self.session_id)
            .field("client_id", &self.client_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct RefreshTokenStore<R>
where
    R: RefreshTokenRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> RefreshTokenStore<R>
where
    R: RefreshTokenRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Keyed digest under which a token is stored
    pub fn digest(&self, token: &str) -> String {
        token_digest(&self.config.token_pepper, token)
    }

    /// Generate a token for a session and store its digest
    pub async fn issue_and_store(
        &self,
        user_id: &UserId,
        session_id: SessionId,
        client_id: &str,
    ) -> AuthResult<IssuedRefreshToken> {
        let token = random_token(REFRESH_TOKEN_BYTES);
        let now = Utc::now();
        let expires_at = expires_after(now, self.config.refresh_token_ttl)?;

        let record = RefreshToken::new(
            self.digest(&token),
            *user_id,
            session_id,
            client_id.to_string(),
            now,
            expires_at,
        );

        bounded(
            self.config.store_timeout,
            "insert_refresh_token",
            self.repo.insert_refresh_token(&record),
        )
        .await?;

        tracing::debug!(user_id = %user_id, session_id = %session_id, "Refresh token issued");

        Ok(IssuedRefreshToken {
            token,
            session_id,
            client_id: client_id.to_string(),
            expires_at,
        })
    }

    /// Spend a presented token. True exactly once per active token; any
    /// other case is false without saying why.
    pub async fn validate_and_consume(&self, user_id: &UserId, presented: &str) -> AuthResult<bool> {
        if presented.is_empty() {
            return Ok(false);
        }

        let outcome = bounded(
            self.config.store_timeout,
            "consume_refresh_token",
            self.repo
                .consume_refresh_token(&self.digest(presented), user_id, Utc::now()),
        )
        .await?;

        match outcome {
            ConsumeOutcome::Consumed(_) => Ok(true),
            ConsumeOutcome::Reused(record) => {
                self.handle_reuse(&record).await;
                Ok(false)
            }
            ConsumeOutcome::Invalid => Ok(false),
        }
    }

    /// Spend the presented token and issue its successor in one store
    /// operation. The successor stays in the same session.
    ///
    /// `session_id` must match the session the presented token belongs to.
    pub async fn rotate(
        &self,
        user_id: &UserId,
        session_id: SessionId,
        presented: &str,
    ) -> AuthResult<IssuedRefreshToken> {
        if presented.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let token = random_token(REFRESH_TOKEN_BYTES);
        let now = Utc::now();
        let rotation = RefreshTokenRotation {
            presented_hash: self.digest(presented),
            successor_hash: self.digest(&token),
            session_id,
            expires_at: expires_after(now, self.config.refresh_token_ttl)?,
            now,
        };

        let outcome = bounded(
            self.config.store_timeout,
            "rotate_refresh_token",
            self.repo.rotate_refresh_token(user_id, &rotation),
        )
        .await?;

        match outcome {
            ConsumeOutcome::Consumed(successor) => {
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %successor.session_id,
                    "Refresh token rotated"
                );
                Ok(IssuedRefreshToken {
                    token,
                    session_id: successor.session_id,
                    client_id: successor.client_id,
                    expires_at: successor.expires_at,
                })
            }
            ConsumeOutcome::Reused(record) => {
                self.handle_reuse(&record).await;
                Err(AuthError::InvalidToken)
            }
            ConsumeOutcome::Invalid => Err(AuthError::InvalidToken),
        }
    }

    /// Check a token presented alongside a rejected access token. A token
    /// that was already rotated is handled as reuse; nothing is consumed.
    pub async fn report_replay(&self, user_id: &UserId, presented: &str) -> AuthResult<()> {
        if presented.is_empty() {
            return Ok(());
        }

        let record = bounded(
            self.config.store_timeout,
            "find_refresh_token",
            self.repo.find_refresh_token(&self.digest(presented)),
        )
        .await?;

        if let Some(record) = record.filter(|r| r.user_id == *user_id && r.was_rotated()) {
            self.handle_reuse(&record).await;
        }
        Ok(())
    }

    /// Revoke one token. Idempotent: absent or already revoked is fine.
    pub async fn revoke(&self, user_id: &UserId, presented: &str) -> AuthResult<()> {
        if presented.is_empty() {
            return Ok(());
        }

        let revoked = bounded(
            self.config.store_timeout,
            "revoke_refresh_token",
            self.repo
                .revoke_refresh_token(&self.digest(presented), user_id, Utc::now()),
        )
        .await?;

        if revoked {
            tracing::debug!(user_id = %user_id, "Refresh token revoked");
        }
        Ok(())
    }

    /// Revoke every token of one login session
    pub async fn revoke_session(&self, user_id: &UserId, session_id: &SessionId) -> AuthResult<u64> {
        bounded(
            self.config.store_timeout,
            "revoke_session_tokens",
            self.repo.revoke_session_tokens(user_id, session_id, Utc::now()),
        )
        .await
    }

    /// Revoke every token of the user
    pub async fn revoke_all(&self, user_id: &UserId) -> AuthResult<u64> {
        bounded(
            self.config.store_timeout,
            "revoke_user_tokens",
            self.repo.revoke_user_tokens(user_id, Utc::now()),
        )
        .await
    }

    pub async fn prune_expired(&self) -> AuthResult<u64> {
        bounded(
            self.config.store_timeout,
            "prune_refresh_tokens",
            self.repo.prune_refresh_tokens(Utc::now()),
        )
        .await
    }

    async fn handle_reuse(&self, record: &RefreshToken) {
        tracing::warn!(
            user_id = %record.user_id,
            session_id = %record.session_id,
            client_id = %record.client_id,
            "Rotated refresh token presented again"
        );

        if !self.config.revoke_sessions_on_reuse {
            return;
        }

        match self.revoke_all(&record.user_id).await {
            Ok(revoked) => tracing::warn!(
                user_id = %record.user_id,
                revoked,
                "Revoked all refresh tokens after reuse"
            ),
            Err(e) => tracing::error!(
                user_id = %record.user_id,
                error = %e,
                "Failed to revoke refresh tokens after reuse"
            ),
        }
    }
}
