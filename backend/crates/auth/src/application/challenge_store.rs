//! Two-Factor Challenge Store
//!
//! Issues and redeems short-lived opaque tokens that bind a pending login to
//! a user and client. Only the keyed digest of a token is persisted, and
//! redemption deletes the record in the same store operation that reads it.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::UserId;
use platform::crypto::{random_token, token_digest};

use crate::application::config::AuthConfig;
use crate::application::store_call::{bounded, expires_after};
use crate::domain::entity::two_factor_challenge::TwoFactorChallenge;
use crate::domain::repository::TwoFactorChallengeRepository;
use crate::error::{AuthError, AuthResult};

/// Entropy of a challenge token (256 bits)
const CHALLENGE_TOKEN_BYTES: usize = 32;

pub struct TwoFactorChallengeStore<R>
where
    R: TwoFactorChallengeRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> TwoFactorChallengeStore<R>
where
    R: TwoFactorChallengeRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Persist a challenge for `user_id`/`client_id` and return its token
    pub async fn issue(&self, user_id: &UserId, client_id: &str) -> AuthResult<String> {
        let token = random_token(CHALLENGE_TOKEN_BYTES);
        let now = Utc::now();

        let challenge = TwoFactorChallenge {
            token_hash: token_digest(&self.config.token_pepper, &token),
            user_id: *user_id,
            client_id: client_id.to_string(),
            expires_at: expires_after(now, self.config.challenge_ttl)?,
            created_at: now,
        };

        bounded(
            self.config.store_timeout,
            "insert_challenge",
            self.repo.insert_challenge(&challenge),
        )
        .await?;

        tracing::info!(user_id = %user_id, client_id, "Two-factor challenge issued");
        Ok(token)
    }

    /// Redeem a challenge token exactly once.
    ///
    /// Unknown, expired and already redeemed tokens all fail with
    /// `InvalidChallenge`.
    pub async fn redeem(&self, token: &str) -> AuthResult<(UserId, String)> {
        if token.is_empty() {
            return Err(AuthError::InvalidChallenge);
        }

        let token_hash = token_digest(&self.config.token_pepper, token);
        let challenge = bounded(
            self.config.store_timeout,
            "take_challenge",
            self.repo.take_challenge(&token_hash, Utc::now()),
        )
        .await?
        .ok_or(AuthError::InvalidChallenge)?;

        Ok((challenge.user_id, challenge.client_id))
    }

    pub async fn prune_expired(&self) -> AuthResult<u64> {
        bounded(
            self.config.store_timeout,
            "prune_challenges",
            self.repo.prune_challenges(Utc::now()),
        )
        .await
    }
}
