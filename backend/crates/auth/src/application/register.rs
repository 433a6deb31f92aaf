//! Register Use Case
//!
//! Creates an account under the registering client's password policy.

use std::sync::Arc;

use platform::password::ClearTextPassword;

use crate::application::config::AuthConfig;
use crate::application::store_call::bounded;
use crate::domain::entity::user::User;
use crate::domain::repository::ClientRegistry;
use crate::domain::service::IdentityStore;
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub client_id: String,
}

pub struct RegisterUseCase<R, I>
where
    R: ClientRegistry,
    I: IdentityStore,
{
    repo: Arc<R>,
    identity: Arc<I>,
    config: Arc<AuthConfig>,
}

impl<R, I> RegisterUseCase<R, I>
where
    R: ClientRegistry,
    I: IdentityStore,
{
    pub fn new(repo: Arc<R>, identity: Arc<I>, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            identity,
            config,
        }
    }

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<User> {
        let timeout = self.config.store_timeout;

        let client = bounded(
            timeout,
            "find_active_client",
            self.repo.find_active_client(&input.client_id),
        )
        .await?
        .ok_or(AuthError::ClientNotFound)?;
        let policy = client.auth_policy();

        let email = Email::new(&input.email)?;
        let password = ClearTextPassword::new(input.password)
            .map_err(|e| AuthError::InvalidInput(e.to_string()))?;

        policy.validate_password(password.as_str())?;

        let user = bounded(
            timeout,
            "create_user",
            self.identity.create_user(email, &password),
        )
        .await?;

        tracing::info!(
            user_id = %user.user_id,
            client_id = %client.client_id,
            "User registered"
        );

        Ok(user)
    }
}
