//! Auth Policy Value Object
//!
//! Per-client password, verification and MFA requirements. Stored as the
//! `authPolicy` member of the client's schemaless properties blob and decoded
//! at a parse-or-default boundary: absent or malformed data yields
//! [`AuthPolicy::default`], which requires nothing beyond an 8-character
//! password.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key of the policy object inside a client's properties blob
pub const AUTH_POLICY_KEY: &str = "authPolicy";

/// Default minimum password length
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// First failing password rule, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("password must be at least {min} characters")]
    TooShort { min: usize },

    #[error("password must contain a digit")]
    MissingDigit,

    #[error("password must contain an uppercase letter")]
    MissingUppercase,

    #[error("password must contain a non-alphanumeric character")]
    MissingNonAlphanumeric,
}

/// Client authentication policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthPolicy {
    pub min_password_length: usize,
    pub require_digit: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
    pub require_email_verification: bool,
    pub require_mfa: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            require_digit: false,
            require_uppercase: false,
            require_non_alphanumeric: false,
            require_email_verification: false,
            require_mfa: false,
        }
    }
}

impl AuthPolicy {
    /// Decode the policy embedded in a client's properties blob.
    ///
    /// Never fails: a missing blob, invalid JSON, a non-object document, a
    /// missing `authPolicy` member or a member of the wrong shape all produce
    /// the default policy.
    pub fn resolve(properties: Option<&str>) -> Self {
        let Some(raw) = properties.filter(|raw| !raw.trim().is_empty()) else {
            return Self::default();
        };

        let mut document = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::debug!("Client properties are not a JSON object, using default policy");
                return Self::default();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Client properties are not valid JSON, using default policy");
                return Self::default();
            }
        };

        match document.remove(AUTH_POLICY_KEY) {
            Some(policy @ Value::Object(_)) => serde_json::from_value(policy).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Malformed authPolicy, using default policy");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Check a password against this policy.
    ///
    /// Rules are evaluated as length, digit, uppercase, non-alphanumeric and
    /// the first failure is returned. Character classes are ASCII.
    pub fn validate_password(&self, password: &str) -> Result<(), PolicyViolation> {
        if password.chars().count() < self.min_password_length {
            return Err(PolicyViolation::TooShort {
                min: self.min_password_length,
            });
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PolicyViolation::MissingDigit);
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(PolicyViolation::MissingUppercase);
        }
        if self.require_non_alphanumeric && password.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PolicyViolation::MissingNonAlphanumeric);
        }
        Ok(())
    }

    /// Write this policy into a properties blob, keeping every other key.
    ///
    /// A blob that is absent or not a JSON object is replaced.
    pub fn merge_into(&self, properties: Option<&str>) -> String {
        let mut document = properties
            .and_then(|raw| match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Some(map),
                _ => {
                    tracing::warn!("Replacing unparseable client properties blob");
                    None
                }
            })
            .unwrap_or_else(Map::new);

        let policy = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        document.insert(AUTH_POLICY_KEY.to_string(), policy);

        Value::Object(document).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_on_missing_or_malformed() {
        let cases: [Option<&str>; 9] = [
            None,
            Some(""),
            Some("   "),
            Some("{not json"),
            Some("[1, 2, 3]"),
            Some("\"authPolicy\""),
            Some(r#"{"theme": "dark"}"#),
            Some(r#"{"authPolicy": "strict"}"#),
            Some(r#"{"authPolicy": {"minPasswordLength": -3}}"#),
        ];

        for blob in cases {
            assert_eq!(AuthPolicy::resolve(blob), AuthPolicy::default(), "blob: {blob:?}");
        }
    }

    #[test]
    fn test_resolve_embedded_policy() {
        let blob = r#"{
            "theme": "dark",
            "authPolicy": {"minPasswordLength": 12, "requireDigit": true, "requireMfa": true}
        }"#;
        let policy = AuthPolicy::resolve(Some(blob));

        assert_eq!(policy.min_password_length, 12);
        assert!(policy.require_digit);
        assert!(policy.require_mfa);
        // Unspecified fields take their defaults
        assert!(!policy.require_uppercase);
        assert!(!policy.require_email_verification);
    }

    #[test]
    fn test_validate_password_reports_first_failure() {
        let policy = AuthPolicy {
            min_password_length: 8,
            require_digit: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
            ..AuthPolicy::default()
        };

        // Short and digit-less: length wins
        assert_eq!(
            policy.validate_password("abcd"),
            Err(PolicyViolation::TooShort { min: 8 })
        );
        assert_eq!(
            policy.validate_password("abcdefgh"),
            Err(PolicyViolation::MissingDigit)
        );
        assert_eq!(
            policy.validate_password("abcdefg1"),
            Err(PolicyViolation::MissingUppercase)
        );
        assert_eq!(
            policy.validate_password("Abcdefg1"),
            Err(PolicyViolation::MissingNonAlphanumeric)
        );
        assert_eq!(policy.validate_password("Abcdef1!"), Ok(()));
    }

    #[test]
    fn test_validate_password_counts_code_points() {
        let policy = AuthPolicy {
            min_password_length: 4,
            ..AuthPolicy::default()
        };
        assert!(policy.validate_password("ñññ").is_err());
        assert!(policy.validate_password("ññññ").is_ok());
    }

    #[test]
    fn test_default_policy_only_requires_length() {
        let policy = AuthPolicy::default();
        assert!(policy.validate_password("lowercase").is_ok());
        assert!(policy.validate_password("short").is_err());
    }

    #[test]
    fn test_merge_preserves_unrelated_keys() {
        let policy = AuthPolicy {
            require_mfa: true,
            ..AuthPolicy::default()
        };
        let merged = policy.merge_into(Some(r#"{"theme":"dark","authPolicy":{"requireDigit":true}}"#));

        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["authPolicy"]["requireMfa"], true);
        assert_eq!(value["authPolicy"]["requireDigit"], false);
        assert_eq!(AuthPolicy::resolve(Some(&merged)), policy);
    }

    #[test]
    fn test_merge_replaces_malformed_blob() {
        let merged = AuthPolicy::default().merge_into(Some("{oops"));
        assert_eq!(AuthPolicy::resolve(Some(&merged)), AuthPolicy::default());
        assert!(merged.contains(AUTH_POLICY_KEY));
    }
}
