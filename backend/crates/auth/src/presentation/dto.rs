//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::session::AuthTokens;
use crate::domain::entity::user::User;
use crate::domain::value_object::auth_policy::AuthPolicy;

// ============================================================================
// Register
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
}

// ============================================================================
// Login / Two-Factor
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    pub challenge_token: String,
    pub code: String,
    pub client_id: String,
}

/// Login result: either a session or a pending second factor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum LoginResponse {
    #[serde(rename = "authenticated")]
    Authenticated(TokenResponse),
    #[serde(rename = "twoFactorRequired", rename_all = "camelCase")]
    TwoFactorRequired { challenge_token: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user_id: String,
    pub session_id: String,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub token_type: &'static str,
}

impl From<AuthTokens> for TokenResponse {
    fn from(tokens: AuthTokens) -> Self {
        Self {
            user_id: tokens.user_id.to_string(),
            session_id: tokens.session_id.to_string(),
            access_token: tokens.access_token,
            access_token_expires_at: tokens.access_token_expires_at,
            refresh_token: tokens.refresh_token,
            refresh_token_expires_at: tokens.refresh_token_expires_at,
            token_type: "Bearer",
        }
    }
}

// ============================================================================
// Refresh / Logout
// ============================================================================

/// Either field may be omitted when the matching cookie is sent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    pub revoke_all: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub revoked_refresh_tokens: u64,
}

// ============================================================================
// Current User
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub email_verified: bool,
    pub roles: Vec<String>,
    pub two_factor_enabled: bool,
    pub session_id: String,
    pub client_id: String,
}

impl MeResponse {
    pub fn new(
        user: User,
        two_factor_enabled: bool,
        session_id: String,
        client_id: String,
    ) -> Self {
        Self {
            user_id: user.user_id.to_string(),
            email: user.email.as_str().to_string(),
            email_verified: user.email_verified,
            roles: user.roles,
            two_factor_enabled,
            session_id,
            client_id,
        }
    }
}

// ============================================================================
// TOTP
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetupResponse {
    /// Base64-encoded PNG
    pub qr_code: String,
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpCodeRequest {
    pub code: String,
}

// ============================================================================
// Client Policy
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicyResponse {
    pub client_id: String,
    pub auth_policy: AuthPolicy,
}
