//! Application Configuration
//!
//! Configuration for the Auth application layer.

use std::fmt;
use std::time::Duration;

use platform::config::{
    ConfigError, env_bool, env_duration_secs, env_opt, env_or, env_secret_32, env_u32,
};
use platform::cookie::CookieConfig;

use crate::domain::entity::credential::LockoutPolicy;

/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

/// Auth application configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// Lifetime of a two-factor challenge token
    pub challenge_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub access_token_ttl: Duration,
    /// HMAC key for refresh-token, challenge and blacklist digests
    pub token_pepper: [u8; 32],
    /// HS256 signing secret for access tokens
    pub jwt_secret: [u8; 32],
    pub jwt_issuer: String,
    pub lockout: LockoutPolicy,
    /// Upper bound on any single store call
    pub store_timeout: Duration,
    /// Revoke every refresh token of a user when a rotated token is replayed
    pub revoke_sessions_on_reuse: bool,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    /// Refresh cookie is only sent to the auth routes
    pub refresh_cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
    /// Issuer shown in authenticator apps
    pub totp_issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(5 * 60),
            refresh_token_ttl: Duration::from_secs(14 * 24 * 3600),
            access_token_ttl: Duration::from_secs(15 * 60),
            token_pepper: [0u8; 32],
            jwt_secret: [0u8; 32],
            jwt_issuer: "identity".to_string(),
            lockout: LockoutPolicy::default(),
            store_timeout: Duration::from_secs(5),
            revoke_sessions_on_reuse: true,
            access_cookie_name: "access_token".to_string(),
            refresh_cookie_name: "refresh_token".to_string(),
            refresh_cookie_path: "/api/auth".to_string(),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            password_pepper: None,
            totp_issuer: "identity".to_string(),
        }
    }
}

impl AuthConfig {
    /// Create config with random secrets (tokens do not survive a restart)
    pub fn with_random_secrets() -> Self {
        Self {
            token_pepper: random_secret(),
            jwt_secret: random_secret(),
            ..Default::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secrets()
        }
    }

    /// Load from `AUTH_*` environment variables.
    ///
    /// `AUTH_TOKEN_PEPPER` and `AUTH_JWT_SECRET` (base64, 32 bytes) are
    /// required unless `AUTH_DEV_MODE` is set, in which case missing secrets
    /// are generated and cookies drop the `Secure` flag.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dev_mode = env_bool("AUTH_DEV_MODE", false)?;
        let base = if dev_mode {
            Self::development()
        } else {
            Self::default()
        };

        let token_pepper = match env_secret_32("AUTH_TOKEN_PEPPER")? {
            Some(secret) => secret,
            None if dev_mode => base.token_pepper,
            None => return Err(ConfigError::Missing("AUTH_TOKEN_PEPPER".to_string())),
        };
        let jwt_secret = match env_secret_32("AUTH_JWT_SECRET")? {
            Some(secret) => secret,
            None if dev_mode => base.jwt_secret,
            None => return Err(ConfigError::Missing("AUTH_JWT_SECRET".to_string())),
        };

        let cookie_same_site = match env_opt("AUTH_COOKIE_SAME_SITE") {
            None => base.cookie_same_site,
            Some(v) => SameSite::parse(&v).ok_or_else(|| ConfigError::Invalid {
                name: "AUTH_COOKIE_SAME_SITE".to_string(),
                reason: format!("expected Strict, Lax or None, got '{v}'"),
            })?,
        };

        let max_failed_attempts = env_u32(
            "AUTH_LOCKOUT_MAX_ATTEMPTS",
            base.lockout.max_failed_attempts,
        )?;
        if max_failed_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "AUTH_LOCKOUT_MAX_ATTEMPTS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            challenge_ttl: env_duration_secs("AUTH_CHALLENGE_TTL_SECS", base.challenge_ttl)?,
            refresh_token_ttl: env_duration_secs("AUTH_REFRESH_TTL_SECS", base.refresh_token_ttl)?,
            access_token_ttl: env_duration_secs("AUTH_ACCESS_TTL_SECS", base.access_token_ttl)?,
            token_pepper,
            jwt_secret,
            jwt_issuer: env_or("AUTH_JWT_ISSUER", &base.jwt_issuer),
            lockout: LockoutPolicy {
                max_failed_attempts,
                lockout_duration: env_duration_secs(
                    "AUTH_LOCKOUT_DURATION_SECS",
                    base.lockout.lockout_duration,
                )?,
            },
            store_timeout: env_duration_secs("AUTH_STORE_TIMEOUT_SECS", base.store_timeout)?,
            revoke_sessions_on_reuse: env_bool(
                "AUTH_REVOKE_SESSIONS_ON_REUSE",
                base.revoke_sessions_on_reuse,
            )?,
            access_cookie_name: env_or("AUTH_ACCESS_COOKIE_NAME", &base.access_cookie_name),
            refresh_cookie_name: env_or("AUTH_REFRESH_COOKIE_NAME", &base.refresh_cookie_name),
            refresh_cookie_path: base.refresh_cookie_path,
            cookie_secure: env_bool("AUTH_COOKIE_SECURE", base.cookie_secure)?,
            cookie_same_site,
            password_pepper: env_opt("AUTH_PASSWORD_PEPPER").map(String::into_bytes),
            totp_issuer: env_or("AUTH_TOTP_ISSUER", &base.totp_issuer),
        })
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }

    pub fn access_cookie(&self) -> CookieConfig {
        CookieConfig::http_only(&self.access_cookie_name, "/")
            .with_secure(self.cookie_secure)
            .with_same_site(self.cookie_same_site)
            .with_max_age(self.access_token_ttl.as_secs())
    }

    pub fn refresh_cookie(&self) -> CookieConfig {
        CookieConfig::http_only(&self.refresh_cookie_name, &self.refresh_cookie_path)
            .with_secure(self.cookie_secure)
            .with_same_site(self.cookie_same_site)
            .with_max_age(self.refresh_token_ttl.as_secs())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("challenge_ttl", &self.challenge_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("token_pepper", &"[REDACTED]")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("lockout", &self.lockout)
            .field("store_timeout", &self.store_timeout)
            .field("revoke_sessions_on_reuse", &self.revoke_sessions_on_reuse)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_same_site", &self.cookie_same_site)
            .field("password_pepper", &self.password_pepper.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&platform::crypto::random_bytes(32));
    secret
}
