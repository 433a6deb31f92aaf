//! Access Token Blacklist
//!
//! Access tokens invalidated before their natural expiry. Entries are keyed
//! by the token's keyed digest and carry the token's own expiry so they can
//! be pruned once the token would have died anyway.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::crypto::token_digest;

use crate::application::config::AuthConfig;
use crate::application::store_call::bounded;
use crate::domain::entity::blacklist_entry::BlacklistEntry;
use crate::domain::repository::AccessTokenBlacklistRepository;
use crate::error::AuthResult;

pub struct AccessTokenBlacklist<R>
where
    R: AccessTokenBlacklistRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> AccessTokenBlacklist<R>
where
    R: AccessTokenBlacklistRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Reject `access_token` until `expires_at`. Already expired tokens are
    /// not recorded.
    pub async fn blacklist(
        &self,
        user_id: &UserId,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let now = Utc::now();
        if expires_at <= now {
            return Ok(());
        }

        let entry = BlacklistEntry {
            token_hash: token_digest(&self.config.token_pepper, access_token),
            user_id: *user_id,
            blacklisted_at: now,
            expires_at,
        };

        bounded(
            self.config.store_timeout,
            "insert_blacklist_entry",
            self.repo.insert_blacklist_entry(&entry),
        )
        .await?;

        tracing::debug!(user_id = %user_id, "Access token blacklisted");
        Ok(())
    }

    pub async fn is_blacklisted(&self, user_id: &UserId, access_token: &str) -> AuthResult<bool> {
        let token_hash = token_digest(&self.config.token_pepper, access_token);
        bounded(
            self.config.store_timeout,
            "is_blacklisted",
            self.repo.is_blacklisted(&token_hash, user_id),
        )
        .await
    }

    pub async fn prune_expired(&self) -> AuthResult<u64> {
        bounded(
            self.config.store_timeout,
            "prune_blacklist",
            self.repo.prune_blacklist(Utc::now()),
        )
        .await
    }
}
