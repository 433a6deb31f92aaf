//! Logout Use Case
//!
//! Revokes refresh tokens and blacklists the presented access token. The
//! only failure is an access token that does not establish the caller's
//! identity.

use std::sync::Arc;

use kernel::id::UserId;

use crate::application::access_token_blacklist::AccessTokenBlacklist;
use crate::application::config::AuthConfig;
use crate::application::refresh_token_store::RefreshTokenStore;
use crate::domain::repository::{AccessTokenBlacklistRepository, RefreshTokenRepository};
use crate::domain::service::AccessTokenSigner;
use crate::error::{AuthError, AuthResult};

pub struct LogoutInput {
    pub user_id: UserId,
    pub access_token: String,
    /// Refresh token held by the caller, revoked in addition to the session
    pub refresh_token: Option<String>,
    /// Revoke every session of the user instead of only the current one
    pub revoke_all: bool,
}

pub struct LogoutUseCase<R, S>
where
    R: RefreshTokenRepository + AccessTokenBlacklistRepository,
    S: AccessTokenSigner,
{
    refresh_tokens: RefreshTokenStore<R>,
    blacklist: AccessTokenBlacklist<R>,
    signer: Arc<S>,
}

impl<R, S> LogoutUseCase<R, S>
where
    R: RefreshTokenRepository + AccessTokenBlacklistRepository,
    S: AccessTokenSigner,
{
    pub fn new(repo: Arc<R>, signer: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self {
            refresh_tokens: RefreshTokenStore::new(repo.clone(), config.clone()),
            blacklist: AccessTokenBlacklist::new(repo, config),
            signer,
        }
    }

    /// Returns the number of refresh tokens revoked
    pub async fn execute(&self, input: LogoutInput) -> AuthResult<u64> {
        let claims = self
            .signer
            .decode_access_token(&input.access_token, false)
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.user_id() != input.user_id {
            tracing::warn!(user_id = %input.user_id, "Logout with another user's access token");
            return Err(AuthError::InvalidToken);
        }

        let user_id = input.user_id;
        let session_id = claims.session_id();

        let revoked = if input.revoke_all {
            self.refresh_tokens.revoke_all(&user_id).await?
        } else {
            self.refresh_tokens
                .revoke_session(&user_id, &session_id)
                .await?
        };

        if let Some(refresh_token) = input.refresh_token.as_deref() {
            self.refresh_tokens.revoke(&user_id, refresh_token).await?;
        }

        self.blacklist
            .blacklist(&user_id, &input.access_token, claims.expires_at())
            .await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            revoke_all = input.revoke_all,
            revoked,
            "User logged out"
        );

        Ok(revoked)
    }
}
