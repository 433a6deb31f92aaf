//! JWT Access Token Signer
//!
//! HS256 access tokens carrying user, roles, client and session.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use kernel::id::SessionId;
use uuid::Uuid;

use crate::application::config::AuthConfig;
use crate::application::store_call::expires_after;
use crate::domain::entity::user::User;
use crate::domain::service::{AccessTokenClaims, AccessTokenSigner, IssuedAccessToken};
use crate::error::{AuthError, AuthResult};

#[derive(Clone)]
pub struct JwtAccessTokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtAccessTokenSigner {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.jwt_issuer.clone(),
            config.access_token_ttl,
        )
    }

    fn validation(&self, validate_expiry: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = validate_expiry;
        validation.leeway = 0;
        validation
    }
}

impl AccessTokenSigner for JwtAccessTokenSigner {
    fn issue_access_token(
        &self,
        user: &User,
        client_id: &str,
        session_id: SessionId,
    ) -> AuthResult<IssuedAccessToken> {
        let now = Utc::now();
        let expires_at = expires_after(now, self.ttl)?;

        let claims = AccessTokenClaims {
            sub: user.user_id.into_uuid(),
            roles: user.roles.clone(),
            client_id: client_id.to_string(),
            sid: session_id.into_uuid(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign access token: {e}")))?;

        Ok(IssuedAccessToken { token, claims })
    }

    fn decode_access_token(
        &self,
        token: &str,
        validate_expiry: bool,
    ) -> AuthResult<AccessTokenClaims> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation(validate_expiry))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::email::Email;

    fn user() -> User {
        let mut user = User::new(Email::new("jwt@example.com").unwrap());
        user.roles = vec!["admin".to_string()];
        user
    }

    fn signer(ttl: Duration) -> JwtAccessTokenSigner {
        JwtAccessTokenSigner::new(&[7u8; 32], "identity", ttl)
    }

    #[test]
    fn test_issue_and_decode() {
        let signer = signer(Duration::from_secs(900));
        let user = user();
        let session_id = SessionId::new();

        let issued = signer.issue_access_token(&user, "web", session_id).unwrap();
        let claims = signer.decode_access_token(&issued.token, true).unwrap();

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.user_id(), user.user_id);
        assert_eq!(claims.session_id(), session_id);
        assert_eq!(claims.client_id, "web");
        assert_eq!(claims.roles, vec!["admin".to_string()]);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_expired_token_decodes_only_without_expiry_check() {
        let signer = signer(Duration::ZERO);
        let issued = signer
            .issue_access_token(&user(), "web", SessionId::new())
            .unwrap();
        std::thread::sleep(Duration::from_millis(1100));

        assert!(matches!(
            signer.decode_access_token(&issued.token, true),
            Err(AuthError::InvalidToken)
        ));
        assert!(signer.decode_access_token(&issued.token, false).is_ok());
    }

    #[test]
    fn test_rejects_foreign_secret_and_issuer() {
        let issued = signer(Duration::from_secs(60))
            .issue_access_token(&user(), "web", SessionId::new())
            .unwrap();

        let other_secret = JwtAccessTokenSigner::new(&[8u8; 32], "identity", Duration::from_secs(60));
        assert!(other_secret.decode_access_token(&issued.token, false).is_err());

        let other_issuer = JwtAccessTokenSigner::new(&[7u8; 32], "elsewhere", Duration::from_secs(60));
        assert!(other_issuer.decode_access_token(&issued.token, false).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(
            signer(Duration::from_secs(60))
                .decode_access_token("not.a.jwt", false)
                .is_err()
        );
    }
}
