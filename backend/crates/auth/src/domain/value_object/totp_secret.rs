//! TOTP Secret Value Object
//!
//! Authenticator-app compatible settings: SHA-1, 6 digits, 30 second step,
//! one step of clock skew either side.

use std::fmt;

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{AuthError, AuthResult};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
const TOTP_SKEW: u8 = 1;

#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret {
    /// Base32-encoded secret
    secret_base32: String,
}

impl TotpSecret {
    /// Generate a new random secret (160 bits)
    pub fn generate() -> Self {
        Self {
            secret_base32: Secret::generate_secret().to_encoded().to_string(),
        }
    }

    /// Create from a stored base32 string
    pub fn from_base32(secret: impl Into<String>) -> AuthResult<Self> {
        let secret_base32 = secret.into();
        Secret::Encoded(secret_base32.clone())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("invalid TOTP secret: {e}")))?;

        Ok(Self { secret_base32 })
    }

    pub fn as_base32(&self) -> &str {
        &self.secret_base32
    }

    fn to_totp(&self, issuer: &str, account_name: &str) -> AuthResult<TOTP> {
        let bytes = Secret::Encoded(self.secret_base32.clone())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("invalid TOTP secret: {e}")))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            bytes,
            Some(issuer.to_string()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::Internal(format!("failed to build TOTP: {e}")))
    }

    /// Check a code against the current time window
    pub fn verify(&self, code: &str, issuer: &str, account_name: &str) -> AuthResult<bool> {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.to_totp(issuer, account_name)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// otpauth:// URL for authenticator enrolment
    pub fn otpauth_url(&self, issuer: &str, account_name: &str) -> AuthResult<String> {
        Ok(self.to_totp(issuer, account_name)?.get_url())
    }

    /// QR code for the otpauth URL, as base64-encoded PNG
    pub fn qr_code_base64(&self, issuer: &str, account_name: &str) -> AuthResult<String> {
        self.to_totp(issuer, account_name)?
            .get_qr_base64()
            .map_err(|e| AuthError::Internal(format!("failed to render QR code: {e}")))
    }

    #[cfg(test)]
    pub fn generate_current(&self, issuer: &str, account_name: &str) -> String {
        self.to_totp(issuer, account_name)
            .unwrap()
            .generate_current()
            .unwrap()
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSecret")
            .field("secret_base32", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "identity-test";
    const ACCOUNT: &str = "user@example.com";

    #[test]
    fn test_verify_current_code() {
        let secret = TotpSecret::generate();
        let code = secret.generate_current(ISSUER, ACCOUNT);
        assert!(secret.verify(&code, ISSUER, ACCOUNT).unwrap());
    }

    #[test]
    fn test_reject_malformed_codes() {
        let secret = TotpSecret::generate();
        assert!(!secret.verify("12345", ISSUER, ACCOUNT).unwrap());
        assert!(!secret.verify("abcdef", ISSUER, ACCOUNT).unwrap());
        assert!(!secret.verify("", ISSUER, ACCOUNT).unwrap());
    }

    #[test]
    fn test_from_base32_roundtrip_and_rejects_garbage() {
        let secret = TotpSecret::generate();
        let restored = TotpSecret::from_base32(secret.as_base32()).unwrap();
        assert_eq!(secret, restored);
        assert!(TotpSecret::from_base32("not base32 !!").is_err());
    }

    #[test]
    fn test_otpauth_url() {
        let secret = TotpSecret::generate();
        let url = secret.otpauth_url(ISSUER, ACCOUNT).unwrap();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains(secret.as_base32()));
    }

    #[test]
    fn test_debug_redaction() {
        let secret = TotpSecret::generate();
        assert!(!format!("{secret:?}").contains(secret.as_base32()));
    }
}
