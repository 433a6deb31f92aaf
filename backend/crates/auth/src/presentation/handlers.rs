//! HTTP Handlers

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use platform::cookie::{delete_cookie_header, extract_cookie, set_cookie_header};

use crate::application::config::AuthConfig;
use crate::application::{
    AuthTokens, CredentialIdentityStore, LoginInput, LoginOutcome, LoginUseCase, LogoutInput,
    LogoutUseCase, RefreshInput, RefreshUseCase, RegisterInput, RegisterUseCase,
    TotpSetupUseCase, UpdateAuthPolicyUseCase, VerifyTwoFactorInput, VerifyTwoFactorUseCase,
};
use crate::domain::repository::{
    AccessTokenBlacklistRepository, ClientRegistry, CredentialRepository, RefreshTokenRepository,
    TwoFactorChallengeRepository, UserRepository,
};
use crate::domain::service::IdentityStore;
use crate::domain::value_object::auth_policy::AuthPolicy;
use crate::error::{AuthError, AuthResult};
use crate::infra::jwt::JwtAccessTokenSigner;
use crate::presentation::dto::{
    AuthPolicyResponse, LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, MeResponse,
    RefreshRequest, RegisterRequest, RegisterResponse, TokenResponse, TotpCodeRequest,
    TotpSetupResponse, VerifyTwoFactorRequest,
};
use crate::presentation::middleware::{AuthenticatedUser, extract_access_token};

/// Every repository the HTTP surface needs, behind one bound
pub trait AuthStore:
    ClientRegistry
    + UserRepository
    + CredentialRepository
    + TwoFactorChallengeRepository
    + RefreshTokenRepository
    + AccessTokenBlacklistRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> AuthStore for T where
    T: ClientRegistry
        + UserRepository
        + CredentialRepository
        + TwoFactorChallengeRepository
        + RefreshTokenRepository
        + AccessTokenBlacklistRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}

/// Shared state for auth handlers
#[derive(Clone)]
pub struct AuthAppState<R>
where
    R: AuthStore,
{
    pub repo: Arc<R>,
    pub identity: Arc<CredentialIdentityStore<R>>,
    pub signer: Arc<JwtAccessTokenSigner>,
    pub config: Arc<AuthConfig>,
}

impl<R> AuthAppState<R>
where
    R: AuthStore,
{
    pub fn new(repo: R, config: AuthConfig) -> Self {
        let repo = Arc::new(repo);
        let config = Arc::new(config);
        Self {
            identity: Arc::new(CredentialIdentityStore::new(repo.clone(), config.clone())),
            signer: Arc::new(JwtAccessTokenSigner::from_config(&config)),
            repo,
            config,
        }
    }
}

// ============================================================================
// Register
// ============================================================================

/// POST /api/auth/register
pub async fn register<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthStore,
{
    let use_case = RegisterUseCase::new(
        state.repo.clone(),
        state.identity.clone(),
        state.config.clone(),
    );

    let user = use_case
        .execute(RegisterInput {
            email: req.email,
            password: req.password,
            client_id: req.client_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.user_id.to_string(),
        }),
    ))
}

// ============================================================================
// Login
// ============================================================================

/// POST /api/auth/login
pub async fn login<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthStore,
{
    let use_case = LoginUseCase::new(
        state.repo.clone(),
        state.identity.clone(),
        state.signer.clone(),
        state.config.clone(),
    );

    let outcome = use_case
        .execute(LoginInput {
            email: req.email,
            password: req.password,
            client_id: req.client_id,
        })
        .await?;

    match outcome {
        LoginOutcome::Authenticated(tokens) => {
            let cookies = token_cookies(&state.config, &tokens);
            Ok((
                cookies,
                Json(LoginResponse::Authenticated(TokenResponse::from(tokens))),
            )
                .into_response())
        }
        LoginOutcome::TwoFactorPending { challenge_token } => {
            Ok(Json(LoginResponse::TwoFactorRequired { challenge_token }).into_response())
        }
    }
}

/// POST /api/auth/2fa/verify
pub async fn verify_two_factor<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<VerifyTwoFactorRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthStore,
{
    let use_case = VerifyTwoFactorUseCase::new(
        state.repo.clone(),
        state.identity.clone(),
        state.signer.clone(),
        state.config.clone(),
    );

    let tokens = use_case
        .execute(VerifyTwoFactorInput {
            challenge_token: req.challenge_token,
            code: req.code,
            client_id: req.client_id,
        })
        .await?;

    let cookies = token_cookies(&state.config, &tokens);
    Ok((cookies, Json(TokenResponse::from(tokens))))
}

// ============================================================================
// Refresh / Logout
// ============================================================================

/// POST /api/auth/refresh
///
/// Tokens come from the JSON body, falling back to the bearer header and
/// cookies.
pub async fn refresh<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
    body: Bytes,
) -> AuthResult<impl IntoResponse>
where
    R: AuthStore,
{
    let req: RefreshRequest = optional_json(&body)?;

    let access_token = req
        .access_token
        .filter(|t| !t.is_empty())
        .or_else(|| extract_access_token(&headers, &state.config))
        .ok_or(AuthError::InvalidToken)?;
    let refresh_token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| extract_cookie(&headers, &state.config.refresh_cookie_name))
        .ok_or(AuthError::InvalidToken)?;

    let use_case = RefreshUseCase::new(
        state.repo.clone(),
        state.identity.clone(),
        state.signer.clone(),
        state.config.clone(),
    );

    let tokens = use_case
        .execute(RefreshInput {
            access_token,
            refresh_token,
        })
        .await?;

    let cookies = token_cookies(&state.config, &tokens);
    Ok((cookies, Json(TokenResponse::from(tokens))))
}

/// POST /api/auth/logout (authenticated)
pub async fn logout<R>(
    State(state): State<AuthAppState<R>>,
    caller: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> AuthResult<impl IntoResponse>
where
    R: AuthStore,
{
    let req: LogoutRequest = optional_json(&body)?;

    let refresh_token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| extract_cookie(&headers, &state.config.refresh_cookie_name));

    let use_case = LogoutUseCase::new(
        state.repo.clone(),
        state.signer.clone(),
        state.config.clone(),
    );

    let revoked = use_case
        .execute(LogoutInput {
            user_id: caller.user_id,
            access_token: caller.access_token,
            refresh_token,
            revoke_all: req.revoke_all,
        })
        .await?;

    let mut cookies = HeaderMap::new();
    for cookie in [
        delete_cookie_header(&state.config.access_cookie()),
        delete_cookie_header(&state.config.refresh_cookie()),
    ]
    .into_iter()
    .flatten()
    {
        cookies.append(header::SET_COOKIE, cookie);
    }

    Ok((
        cookies,
        Json(LogoutResponse {
            revoked_refresh_tokens: revoked,
        }),
    ))
}

// ============================================================================
// Current User
// ============================================================================

/// GET /api/auth/me (authenticated)
pub async fn me<R>(
    State(state): State<AuthAppState<R>>,
    caller: AuthenticatedUser,
) -> AuthResult<Json<MeResponse>>
where
    R: AuthStore,
{
    let user = state
        .identity
        .find_by_id(&caller.user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    let two_factor_enabled = state.identity.two_factor_enabled(&user).await?;

    Ok(Json(MeResponse::new(
        user,
        two_factor_enabled,
        caller.session_id.to_string(),
        caller.client_id,
    )))
}

// ============================================================================
// TOTP (authenticated)
// ============================================================================

/// POST /api/auth/2fa/setup
pub async fn totp_setup<R>(
    State(state): State<AuthAppState<R>>,
    caller: AuthenticatedUser,
) -> AuthResult<Json<TotpSetupResponse>>
where
    R: AuthStore,
{
    let use_case = TotpSetupUseCase::new(state.repo.clone(), state.config.clone());
    let output = use_case.setup(&caller.user_id).await?;

    Ok(Json(TotpSetupResponse {
        qr_code: output.qr_code_base64,
        secret: output.secret,
        otpauth_url: output.otpauth_url,
    }))
}

/// POST /api/auth/2fa/confirm
pub async fn totp_confirm<R>(
    State(state): State<AuthAppState<R>>,
    caller: AuthenticatedUser,
    Json(req): Json<TotpCodeRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
{
    let use_case = TotpSetupUseCase::new(state.repo.clone(), state.config.clone());
    use_case.confirm(&caller.user_id, &req.code).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/2fa/disable
pub async fn totp_disable<R>(
    State(state): State<AuthAppState<R>>,
    caller: AuthenticatedUser,
    Json(req): Json<TotpCodeRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
{
    let use_case = TotpSetupUseCase::new(state.repo.clone(), state.config.clone());
    use_case.disable(&caller.user_id, &req.code).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Client Policy (admin)
// ============================================================================

/// PUT /api/auth/clients/{client_id}/policy
pub async fn update_client_policy<R>(
    State(state): State<AuthAppState<R>>,
    caller: AuthenticatedUser,
    Path(client_id): Path<String>,
    Json(policy): Json<AuthPolicy>,
) -> AuthResult<Json<AuthPolicyResponse>>
where
    R: AuthStore,
{
    // Roles are re-read so a demoted admin loses access before the token expires
    let user = state
        .identity
        .find_by_id(&caller.user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    let use_case = UpdateAuthPolicyUseCase::new(state.repo.clone(), state.config.clone());
    let auth_policy = use_case.execute(&user, &client_id, policy).await?;

    Ok(Json(AuthPolicyResponse {
        client_id,
        auth_policy,
    }))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn token_cookies(config: &AuthConfig, tokens: &AuthTokens) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for cookie in [
        set_cookie_header(&config.access_cookie(), &tokens.access_token),
        set_cookie_header(&config.refresh_cookie(), &tokens.refresh_token),
    ]
    .into_iter()
    .flatten()
    {
        headers.append(header::SET_COOKIE, cookie);
    }
    headers
}

/// Parse a JSON body that may be empty
fn optional_json<T>(body: &[u8]) -> AuthResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AuthError::InvalidInput(e.to_string()))
}
