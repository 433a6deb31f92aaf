//! Expired Record Cleanup
//!
//! Removes expired challenges, refresh tokens and blacklist entries. Run at
//! startup and on an interval by the API binary.

use std::sync::Arc;

use crate::application::access_token_blacklist::AccessTokenBlacklist;
use crate::application::challenge_store::TwoFactorChallengeStore;
use crate::application::config::AuthConfig;
use crate::application::refresh_token_store::RefreshTokenStore;
use crate::domain::repository::{
    AccessTokenBlacklistRepository, RefreshTokenRepository, TwoFactorChallengeRepository,
};
use crate::error::AuthResult;

/// Rows removed by one pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub challenges: u64,
    pub refresh_tokens: u64,
    pub blacklist_entries: u64,
}

impl PruneReport {
    pub fn total(&self) -> u64 {
        self.challenges + self.refresh_tokens + self.blacklist_entries
    }
}

pub struct PruneExpiredUseCase<R>
where
    R: TwoFactorChallengeRepository + RefreshTokenRepository + AccessTokenBlacklistRepository,
{
    challenges: TwoFactorChallengeStore<R>,
    refresh_tokens: RefreshTokenStore<R>,
    blacklist: AccessTokenBlacklist<R>,
}

impl<R> PruneExpiredUseCase<R>
where
    R: TwoFactorChallengeRepository + RefreshTokenRepository + AccessTokenBlacklistRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self {
            challenges: TwoFactorChallengeStore::new(repo.clone(), config.clone()),
            refresh_tokens: RefreshTokenStore::new(repo.clone(), config.clone()),
            blacklist: AccessTokenBlacklist::new(repo, config),
        }
    }

    pub async fn execute(&self) -> AuthResult<PruneReport> {
        let report = PruneReport {
            challenges: self.challenges.prune_expired().await?,
            refresh_tokens: self.refresh_tokens.prune_expired().await?,
            blacklist_entries: self.blacklist.prune_expired().await?,
        };

        if report.total() > 0 {
            tracing::info!(
                challenges = report.challenges,
                refresh_tokens = report.refresh_tokens,
                blacklist_entries = report.blacklist_entries,
                "Pruned expired auth records"
            );
        }

        Ok(report)
    }
}
