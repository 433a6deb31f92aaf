//! Auth Middleware
//!
//! Bearer-token authentication for protected routes. The access token is
//! taken from the `Authorization: Bearer` header, or from the access cookie
//! when the header is absent.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use kernel::id::{SessionId, UserId};

use crate::application::AuthenticateUseCase;
use crate::application::config::AuthConfig;
use crate::error::AuthError;
use crate::presentation::handlers::{AuthAppState, AuthStore};

/// Caller identity, inserted into request extensions by [`require_auth`]
#[derive(Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub client_id: String,
    pub roles: Vec<String>,
    /// The token the request was authenticated with
    pub access_token: String,
}

impl std::fmt::Debug for AuthenticatedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedUser")
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("client_id", &self.client_id)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Bearer header first, then the access cookie
pub fn extract_access_token(headers: &HeaderMap, config: &AuthConfig) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| platform::cookie::extract_cookie(headers, &config.access_cookie_name))
}

/// Middleware that requires a valid, non-blacklisted access token
pub async fn require_auth<R>(
    State(state): State<AuthAppState<R>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError>
where
    R: AuthStore,
{
    let token =
        extract_access_token(req.headers(), &state.config).ok_or(AuthError::InvalidToken)?;

    let use_case = AuthenticateUseCase::new(
        state.repo.clone(),
        state.signer.clone(),
        state.config.clone(),
    );
    let claims = use_case.execute(&token).await?;

    req.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.user_id(),
        session_id: claims.session_id(),
        client_id: claims.client_id,
        roles: claims.roles,
        access_token: token,
    });

    Ok(next.run(req).await)
}
