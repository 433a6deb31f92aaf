//! Session issuance
//!
//! The final step shared by direct login and two-factor verification: a new
//! session id, a signed access token and a stored refresh token.

use std::fmt;

use chrono::{DateTime, Utc};
use kernel::id::{SessionId, UserId};

use crate::application::refresh_token_store::RefreshTokenStore;
use crate::domain::entity::user::User;
use crate::domain::repository::RefreshTokenRepository;
use crate::domain::service::AccessTokenSigner;
use crate::error::AuthResult;

/// Tokens delivered to the caller after authentication or refresh
#[derive(Clone)]
pub struct AuthTokens {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("access_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish()
    }
}

/// Start a new session for an authenticated user.
///
/// The access token is signed before anything is stored, so a signing
/// failure leaves no refresh token behind.
pub(crate) async fn start_session<R, S>(
    refresh_tokens: &RefreshTokenStore<R>,
    signer: &S,
    user: &User,
    client_id: &str,
) -> AuthResult<AuthTokens>
where
    R: RefreshTokenRepository,
    S: AccessTokenSigner,
{
    let session_id = SessionId::new();
    let access = signer.issue_access_token(user, client_id, session_id)?;
    let refresh = refresh_tokens
        .issue_and_store(&user.user_id, session_id, client_id)
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        session_id = %session_id,
        client_id,
        "Session established"
    );

    Ok(AuthTokens {
        user_id: user.user_id,
        session_id,
        access_token_expires_at: access.claims.expires_at(),
        access_token: access.token,
        refresh_token: refresh.token,
        refresh_token_expires_at: refresh.expires_at,
    })
}
