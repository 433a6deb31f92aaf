//! Credential-backed Identity Store
//!
//! [`IdentityStore`] over the user and credential repositories: Argon2id
//! password checks with lockout bookkeeping, and TOTP verification.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use kernel::id::UserId;
use platform::password::{ClearTextPassword, HashedPassword};

use crate::application::config::AuthConfig;
use crate::domain::entity::{
    credential::{AttemptReservation, Credential, LockoutPolicy},
    user::User,
};
use crate::domain::repository::{CredentialRepository, UserRepository};
use crate::domain::service::{IdentityStore, PasswordCheck};
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Argon2id hash with the default parameters and a throwaway salt.
/// Verified against when the account does not exist.
const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$abq0pGafvq1kE8MM0cziJw$Lf+LIALR7+cQODpmeNEIYfZ/CS6wrI4FaDwWYTeqY6I";

static DUMMY_HASH: LazyLock<Option<HashedPassword>> =
    LazyLock::new(|| HashedPassword::from_phc_string(DUMMY_PASSWORD_HASH).ok());

pub struct CredentialIdentityStore<R>
where
    R: UserRepository + CredentialRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> CredentialIdentityStore<R>
where
    R: UserRepository + CredentialRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    fn verify_password(&self, hash: &HashedPassword, password: &str) -> bool {
        match ClearTextPassword::new(password.to_string()) {
            Ok(password) => hash.verify(&password, self.config.pepper()),
            Err(_) => false,
        }
    }
}

impl<R> IdentityStore for CredentialIdentityStore<R>
where
    R: UserRepository + CredentialRepository + Send + Sync,
{
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        self.repo.find_user_by_email(email).await
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        self.repo.find_user_by_id(user_id).await
    }

    async fn check_password(&self, user: &User, password: &str) -> AuthResult<PasswordCheck> {
        let now = Utc::now();
        let policy = self.config.lockout;

        // The attempt is counted before the hash is checked, so concurrent
        // guesses cannot outrun the threshold.
        let Some((credential, reservation)) = self
            .repo
            .reserve_login_attempt(&user.user_id, &policy, now)
            .await?
        else {
            tracing::warn!(user_id = %user.user_id, "User has no credential record");
            self.check_unknown_user_password(password);
            return Ok(PasswordCheck::Failed);
        };

        let locks_account = match reservation {
            AttemptReservation::Locked { retry_after } => {
                return Ok(PasswordCheck::LockedOut { retry_after });
            }
            AttemptReservation::Granted { locks_account } => locks_account,
        };

        if !self.verify_password(&credential.password_hash, password) {
            if locks_account {
                tracing::warn!(
                    user_id = %user.user_id,
                    lockout_secs = policy.lockout_duration.as_secs(),
                    "Account locked after repeated failed logins"
                );
            }
            return Ok(PasswordCheck::Failed);
        }

        // Only the lock this attempt placed is lifted; one set by a
        // concurrent failure stays.
        self.repo
            .reset_failed_attempts(&user.user_id, locks_account)
            .await?;

        Ok(PasswordCheck::Succeeded {
            requires_two_factor: credential.two_factor_enabled(),
        })
    }

    fn check_unknown_user_password(&self, password: &str) {
        match DUMMY_HASH.as_ref() {
            Some(hash) => {
                let _ = self.verify_password(hash, password);
            }
            None => tracing::error!("Dummy password hash failed to parse"),
        }
    }

    async fn two_factor_enabled(&self, user: &User) -> AuthResult<bool> {
        Ok(self
            .repo
            .find_credential(&user.user_id)
            .await?
            .is_some_and(|c| c.two_factor_enabled()))
    }

    async fn verify_totp(&self, user: &User, code: &str) -> AuthResult<bool> {
        let Some(credential) = self.repo.find_credential(&user.user_id).await? else {
            return Ok(false);
        };

        match (&credential.totp_secret, credential.totp_enabled) {
            (Some(secret), true) => {
                secret.verify(code, &self.config.totp_issuer, user.email.as_str())
            }
            _ => Ok(false),
        }
    }

    async fn create_user(&self, email: Email, password: &ClearTextPassword) -> AuthResult<User> {
        let password_hash = password
            .hash(self.config.pepper())
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let user = User::new(email);
        let credential = Credential::new(user.user_id, password_hash);
        self.repo.create_user(&user, &credential).await?;

        Ok(user)
    }

    fn lockout_policy(&self) -> LockoutPolicy {
        self.config.lockout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_hash_matches_default_parameters() {
        let dummy = HashedPassword::from_phc_string(DUMMY_PASSWORD_HASH).unwrap();
        let password = ClearTextPassword::new("anything-at-all".to_string()).unwrap();
        let fresh = password.hash(None).unwrap();

        let params = |phc: &str| phc.rsplitn(3, '$').nth(2).map(str::to_string);
        assert_eq!(
            params(dummy.as_phc_string()),
            params(fresh.as_phc_string())
        );
        assert!(!dummy.verify(&password, None));
    }
}
