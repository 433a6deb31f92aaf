//! Two-Factor Verification Use Case
//!
//! `MfaPending -> Authenticated -> Completed`: redeem the challenge token,
//! check the TOTP code, then issue the session. The challenge is spent by
//! the first attempt whatever the code, so a wrong code means logging in
//! again.

use std::sync::Arc;

use crate::application::challenge_store::TwoFactorChallengeStore;
use crate::application::config::AuthConfig;
use crate::application::refresh_token_store::RefreshTokenStore;
use crate::application::session::{AuthTokens, start_session};
use crate::application::store_call::bounded;
use crate::domain::repository::{ClientRegistry, RefreshTokenRepository, TwoFactorChallengeRepository};
use crate::domain::service::{AccessTokenSigner, IdentityStore};
use crate::error::{AuthError, AuthResult};

pub struct VerifyTwoFactorInput {
    pub challenge_token: String,
    pub code: String,
    pub client_id: String,
}

pub struct VerifyTwoFactorUseCase<R, I, S>
where
    R: ClientRegistry + TwoFactorChallengeRepository + RefreshTokenRepository,
    I: IdentityStore,
    S: AccessTokenSigner,
{
    repo: Arc<R>,
    identity: Arc<I>,
    challenges: TwoFactorChallengeStore<R>,
    refresh_tokens: RefreshTokenStore<R>,
    signer: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<R, I, S> VerifyTwoFactorUseCase<R, I, S>
where
    R: ClientRegistry + TwoFactorChallengeRepository + RefreshTokenRepository,
    I: IdentityStore,
    S: AccessTokenSigner,
{
    pub fn new(repo: Arc<R>, identity: Arc<I>, signer: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self {
            challenges: TwoFactorChallengeStore::new(repo.clone(), config.clone()),
            refresh_tokens: RefreshTokenStore::new(repo.clone(), config.clone()),
            repo,
            identity,
            signer,
            config,
        }
    }

    pub async fn execute(&self, input: VerifyTwoFactorInput) -> AuthResult<AuthTokens> {
        let timeout = self.config.store_timeout;

        let (user_id, bound_client_id) = self.challenges.redeem(&input.challenge_token).await?;

        if bound_client_id != input.client_id {
            tracing::warn!(
                user_id = %user_id,
                client_id = %input.client_id,
                "Two-factor challenge presented by a different client"
            );
            return Err(AuthError::InvalidChallenge);
        }

        let client = bounded(
            timeout,
            "find_active_client",
            self.repo.find_active_client(&input.client_id),
        )
        .await?
        .ok_or(AuthError::ClientNotFound)?;

        let user = bounded(timeout, "find_by_id", self.identity.find_by_id(&user_id))
            .await?
            .ok_or(AuthError::InvalidChallenge)?;

        let code_valid = bounded(
            timeout,
            "verify_totp",
            self.identity.verify_totp(&user, &input.code),
        )
        .await?;

        if !code_valid {
            tracing::warn!(user_id = %user.user_id, "Invalid two-factor code");
            return Err(AuthError::InvalidChallenge);
        }

        start_session(
            &self.refresh_tokens,
            self.signer.as_ref(),
            &user,
            &client.client_id,
        )
        .await
    }
}
