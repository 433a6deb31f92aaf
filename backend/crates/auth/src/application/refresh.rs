//! Refresh Use Case
//!
//! Exchanges a refresh token for a new access/refresh pair. The presented
//! access token only identifies the user and session: its signature is
//! checked, its expiry is not.
//!
//! An access token that was already blacklisted is refused before anything
//! is spent. Order: sign the new access token, rotate the refresh token in one store
//! operation, then blacklist the old access token. A blacklist failure after
//! a successful rotation is logged and the new tokens are still returned,
//! because the old refresh token is already spent.

use std::sync::Arc;

use chrono::Utc;

use crate::application::access_token_blacklist::AccessTokenBlacklist;
use crate::application::config::AuthConfig;
use crate::application::refresh_token_store::RefreshTokenStore;
use crate::application::session::AuthTokens;
use crate::application::store_call::bounded;
use crate::domain::repository::{AccessTokenBlacklistRepository, RefreshTokenRepository};
use crate::domain::service::{AccessTokenSigner, IdentityStore};
use crate::error::{AuthError, AuthResult};

pub struct RefreshInput {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct RefreshUseCase<R, I, S>
where
    R: RefreshTokenRepository + AccessTokenBlacklistRepository,
    I: IdentityStore,
    S: AccessTokenSigner,
{
    identity: Arc<I>,
    refresh_tokens: RefreshTokenStore<R>,
    blacklist: AccessTokenBlacklist<R>,
    signer: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<R, I, S> RefreshUseCase<R, I, S>
where
    R: RefreshTokenRepository + AccessTokenBlacklistRepository,
    I: IdentityStore,
    S: AccessTokenSigner,
{
    pub fn new(repo: Arc<R>, identity: Arc<I>, signer: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self {
            refresh_tokens: RefreshTokenStore::new(repo.clone(), config.clone()),
            blacklist: AccessTokenBlacklist::new(repo, config.clone()),
            identity,
            signer,
            config,
        }
    }

    pub async fn execute(&self, input: RefreshInput) -> AuthResult<AuthTokens> {
        let claims = self
            .signer
            .decode_access_token(&input.access_token, false)
            .map_err(|_| AuthError::InvalidToken)?;
        let user_id = claims.user_id();
        let session_id = claims.session_id();

        if self
            .blacklist
            .is_blacklisted(&user_id, &input.access_token)
            .await?
        {
            tracing::warn!(
                user_id = %user_id,
                session_id = %session_id,
                "Refresh refused: access token already replaced"
            );
            self.refresh_tokens
                .report_replay(&user_id, &input.refresh_token)
                .await?;
            return Err(AuthError::InvalidToken);
        }

        let user = bounded(
            self.config.store_timeout,
            "find_by_id",
            self.identity.find_by_id(&user_id),
        )
        .await?
        .ok_or(AuthError::InvalidToken)?;

        let access = self
            .signer
            .issue_access_token(&user, &claims.client_id, session_id)?;

        let refresh = self
            .refresh_tokens
            .rotate(&user_id, session_id, &input.refresh_token)
            .await?;

        if claims.expires_at() > Utc::now() {
            if let Err(e) = self
                .blacklist
                .blacklist(&user_id, &input.access_token, claims.expires_at())
                .await
            {
                tracing::error!(
                    user_id = %user_id,
                    session_id = %session_id,
                    error = %e,
                    "Failed to blacklist replaced access token"
                );
            }
        }

        tracing::info!(user_id = %user_id, session_id = %session_id, "Tokens refreshed");

        Ok(AuthTokens {
            user_id,
            session_id,
            access_token_expires_at: access.claims.expires_at(),
            access_token: access.token,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
        })
    }
}
