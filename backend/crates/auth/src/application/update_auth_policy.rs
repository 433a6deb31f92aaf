//! Update Auth Policy Use Case
//!
//! Administrators replace a client's auth policy. Only the `authPolicy` key
//! of the client's properties blob changes.

use std::sync::Arc;

use platform::password::MAX_PASSWORD_LENGTH;

use crate::application::config::AuthConfig;
use crate::application::store_call::bounded;
use crate::domain::entity::user::User;
use crate::domain::repository::ClientRegistry;
use crate::domain::value_object::auth_policy::AuthPolicy;
use crate::error::{AuthError, AuthResult};

pub struct UpdateAuthPolicyUseCase<R>
where
    R: ClientRegistry,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> UpdateAuthPolicyUseCase<R>
where
    R: ClientRegistry,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn execute(
        &self,
        caller: &User,
        client_id: &str,
        policy: AuthPolicy,
    ) -> AuthResult<AuthPolicy> {
        if !caller.is_admin() {
            tracing::warn!(user_id = %caller.user_id, client_id, "Policy update by non-admin");
            return Err(AuthError::Forbidden);
        }

        if policy.min_password_length > MAX_PASSWORD_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "minPasswordLength must be at most {MAX_PASSWORD_LENGTH}"
            )));
        }

        let updated = bounded(
            self.config.store_timeout,
            "update_auth_policy",
            self.repo.update_auth_policy(client_id, &policy),
        )
        .await?;

        if !updated {
            return Err(AuthError::ClientNotFound);
        }

        tracing::info!(user_id = %caller.user_id, client_id, ?policy, "Auth policy updated");

        Ok(policy)
    }
}
