//! Access Token Authentication
//!
//! Resolves a bearer access token to its claims: signature, issuer and
//! expiry are checked by the signer, revocation against the blacklist.

use std::sync::Arc;

use crate::application::access_token_blacklist::AccessTokenBlacklist;
use crate::application::config::AuthConfig;
use crate::domain::repository::AccessTokenBlacklistRepository;
use crate::domain::service::{AccessTokenClaims, AccessTokenSigner};
use crate::error::{AuthError, AuthResult};

pub struct AuthenticateUseCase<R, S>
where
    R: AccessTokenBlacklistRepository,
    S: AccessTokenSigner,
{
    blacklist: AccessTokenBlacklist<R>,
    signer: Arc<S>,
}

impl<R, S> AuthenticateUseCase<R, S>
where
    R: AccessTokenBlacklistRepository,
    S: AccessTokenSigner,
{
    pub fn new(repo: Arc<R>, signer: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self {
            blacklist: AccessTokenBlacklist::new(repo, config),
            signer,
        }
    }

    pub async fn execute(&self, access_token: &str) -> AuthResult<AccessTokenClaims> {
        let claims = self
            .signer
            .decode_access_token(access_token, true)
            .map_err(|_| AuthError::InvalidToken)?;

        if self
            .blacklist
            .is_blacklisted(&claims.user_id(), access_token)
            .await?
        {
            tracing::debug!(user_id = %claims.sub, "Blacklisted access token presented");
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }
}
