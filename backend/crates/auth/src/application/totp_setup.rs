//! TOTP Setup Use Case
//!
//! Enrol, confirm and remove the authenticator-app second factor. A new
//! secret stays inactive until a code generated from it is confirmed.

use std::sync::Arc;

use kernel::id::UserId;

use crate::application::config::AuthConfig;
use crate::application::store_call::bounded;
use crate::domain::entity::{credential::Credential, user::User};
use crate::domain::repository::{CredentialRepository, UserRepository};
use crate::error::{AuthError, AuthResult};

/// TOTP setup output
pub struct TotpSetupOutput {
    /// QR code as base64-encoded PNG
    pub qr_code_base64: String,
    /// Secret for manual entry
    pub secret: String,
    /// otpauth:// URL
    pub otpauth_url: String,
}

/// TOTP setup use case
pub struct TotpSetupUseCase<R>
where
    R: UserRepository + CredentialRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> TotpSetupUseCase<R>
where
    R: UserRepository + CredentialRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Generate a pending secret, replacing any earlier unconfirmed one
    pub async fn setup(&self, user_id: &UserId) -> AuthResult<TotpSetupOutput> {
        let (user, mut credential) = self.load(user_id).await?;

        if credential.two_factor_enabled() {
            return Err(AuthError::InvalidInput(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        let secret = credential.setup_totp();
        bounded(
            self.config.store_timeout,
            "update_totp",
            self.repo.update_totp(user_id, Some(&secret), false),
        )
        .await?;

        let issuer = &self.config.totp_issuer;
        let account_name = user.email.as_str();
        let qr_code_base64 = secret.qr_code_base64(issuer, account_name)?;
        let otpauth_url = secret.otpauth_url(issuer, account_name)?;

        tracing::info!(user_id = %user_id, "TOTP setup initiated");

        Ok(TotpSetupOutput {
            qr_code_base64,
            secret: secret.as_base32().to_string(),
            otpauth_url,
        })
    }

    /// Verify a code against the pending secret and enable 2FA
    pub async fn confirm(&self, user_id: &UserId, code: &str) -> AuthResult<()> {
        let (user, mut credential) = self.load(user_id).await?;

        let secret = credential.totp_secret.clone().ok_or_else(|| {
            AuthError::InvalidInput("Two-factor setup has not been started".to_string())
        })?;

        if !secret.verify(code, &self.config.totp_issuer, user.email.as_str())? {
            return Err(AuthError::InvalidChallenge);
        }

        credential.enable_totp();
        bounded(
            self.config.store_timeout,
            "update_totp",
            self.repo.update_totp(user_id, Some(&secret), true),
        )
        .await?;

        tracing::info!(user_id = %user_id, "TOTP enabled");
        Ok(())
    }

    /// Remove the second factor. Requires a current code.
    pub async fn disable(&self, user_id: &UserId, code: &str) -> AuthResult<()> {
        let (user, mut credential) = self.load(user_id).await?;

        let Some(secret) = credential.totp_secret.as_ref().filter(|_| credential.totp_enabled)
        else {
            return Err(AuthError::InvalidInput(
                "Two-factor authentication is not enabled".to_string(),
            ));
        };

        if !secret.verify(code, &self.config.totp_issuer, user.email.as_str())? {
            return Err(AuthError::InvalidChallenge);
        }

        credential.disable_totp();
        bounded(
            self.config.store_timeout,
            "update_totp",
            self.repo.update_totp(user_id, None, false),
        )
        .await?;

        tracing::info!(user_id = %user_id, "TOTP disabled");
        Ok(())
    }

    async fn load(&self, user_id: &UserId) -> AuthResult<(User, Credential)> {
        let timeout = self.config.store_timeout;

        let user = bounded(timeout, "find_user_by_id", self.repo.find_user_by_id(user_id))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let credential = bounded(timeout, "find_credential", self.repo.find_credential(user_id))
            .await?
            .ok_or_else(|| AuthError::Internal("Credential record missing".to_string()))?;

        Ok((user, credential))
    }
}
