//! Login Use Case
//!
//! Drives the login state machine:
//!
//! ```text
//! Start -> ClientResolved -> CredentialChecked -> MfaPending | Authenticated -> Completed
//! ```
//!
//! Steps run strictly in order: client lookup, policy resolution, lockout
//! and password check, email verification gate, then either a two-factor
//! challenge or session issuance. Unknown users and wrong passwords are the
//! same `InvalidCredentials` error, and both pay for an Argon2 verification.

use std::sync::Arc;

use crate::application::challenge_store::TwoFactorChallengeStore;
use crate::application::config::AuthConfig;
use crate::application::refresh_token_store::RefreshTokenStore;
use crate::application::session::{AuthTokens, start_session};
use crate::application::store_call::bounded;
use crate::domain::repository::{ClientRegistry, RefreshTokenRepository, TwoFactorChallengeRepository};
use crate::domain::entity::user::User;
use crate::domain::service::{AccessTokenSigner, IdentityStore, PasswordCheck};
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Login input
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub client_id: String,
}

/// Successful login result
#[derive(Debug)]
pub enum LoginOutcome {
    /// Session established
    Authenticated(AuthTokens),
    /// Password accepted; the second factor must be presented with this token
    TwoFactorPending { challenge_token: String },
}

/// Login use case
pub struct LoginUseCase<R, I, S>
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

impl<R, I, S> LoginUseCase<R, I, S>
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

    pub async fn execute(&self, input: LoginInput) -> AuthResult<LoginOutcome> {
        let timeout = self.config.store_timeout;

        // Start -> ClientResolved
        let client = bounded(
            timeout,
            "find_active_client",
            self.repo.find_active_client(&input.client_id),
        )
        .await?
        .ok_or(AuthError::ClientNotFound)?;

        // ClientResolved -> CredentialChecked
        let policy = client.auth_policy();

        let Some(user) = self.find_user(&input.email).await? else {
            self.identity.check_unknown_user_password(&input.password);
            return Err(AuthError::InvalidCredentials);
        };

        let check = bounded(
            timeout,
            "check_password",
            self.identity.check_password(&user, &input.password),
        )
        .await?;

        // Gated after the hash is checked, whatever the password outcome
        if policy.require_email_verification && !user.email_verified {
            tracing::info!(
                user_id = %user.user_id,
                client_id = %client.client_id,
                "Login refused: email not verified"
            );
            return Err(AuthError::EmailNotVerified);
        }

        let requires_two_factor = match check {
            PasswordCheck::Succeeded {
                requires_two_factor,
            } => requires_two_factor,
            PasswordCheck::LockedOut { retry_after } => {
                tracing::warn!(
                    user_id = %user.user_id,
                    client_id = %client.client_id,
                    retry_after_secs = retry_after.as_secs(),
                    max_failed_attempts = self.identity.lockout_policy().max_failed_attempts,
                    "Login refused: account locked"
                );
                return Err(AuthError::AccountLocked { retry_after });
            }
            PasswordCheck::Failed => {
                tracing::warn!(
                    user_id = %user.user_id,
                    client_id = %client.client_id,
                    "Login refused: wrong password"
                );
                return Err(AuthError::InvalidCredentials);
            }
        };

        // CredentialChecked -> MfaPending
        if requires_two_factor {
            let challenge_token = self.challenges.issue(&user.user_id, &client.client_id).await?;
            return Ok(LoginOutcome::TwoFactorPending { challenge_token });
        }

        if policy.require_mfa {
            tracing::info!(
                user_id = %user.user_id,
                client_id = %client.client_id,
                "Login refused: client requires MFA, none enrolled"
            );
            return Err(AuthError::TwoFactorRequired);
        }

        // CredentialChecked -> Authenticated -> Completed
        let tokens = start_session(
            &self.refresh_tokens,
            self.signer.as_ref(),
            &user,
            &client.client_id,
        )
        .await?;

        Ok(LoginOutcome::Authenticated(tokens))
    }

    async fn find_user(&self, email: &str) -> AuthResult<Option<User>> {
        let Ok(email) = Email::new(email) else {
            return Ok(None);
        };
        bounded(
            self.config.store_timeout,
            "find_by_email",
            self.identity.find_by_email(&email),
        )
        .await
    }
}
