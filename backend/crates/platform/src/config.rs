//! Environment Configuration Helpers
//!
//! Small typed readers over process environment variables. Missing
//! variables fall back to the caller's default; present-but-invalid values
//! are errors so misconfiguration fails at startup instead of silently.

use std::env;
use std::time::Duration;

use base64::{Engine, engine::general_purpose};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Read a string variable, if set and non-empty
pub fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a string variable or return `default`
pub fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// Read a boolean (`true/false/1/0/yes/no`)
pub fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(name) {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                name: name.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}

/// Read an unsigned integer
pub fn env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match env_opt(name) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            reason: format!("expected an unsigned integer, got '{v}'"),
        }),
    }
}

/// Read a duration expressed in whole seconds
pub fn env_duration_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match env_opt(name) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid {
                name: name.to_string(),
                reason: format!("expected seconds, got '{v}'"),
            }),
    }
}

/// Read a base64-encoded 32-byte secret
pub fn env_secret_32(name: &str) -> Result<Option<[u8; 32]>, ConfigError> {
    let Some(v) = env_opt(name) else {
        return Ok(None);
    };

    let bytes = general_purpose::STANDARD
        .decode(v.trim())
        .map_err(|e| ConfigError::Invalid {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    let secret: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| ConfigError::Invalid {
        name: name.to_string(),
        reason: format!("expected 32 bytes, got {}", b.len()),
    })?;

    Ok(Some(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default_and_override() {
        temp_env::with_var("PLATFORM_TEST_NAME", None::<&str>, || {
            assert_eq!(env_or("PLATFORM_TEST_NAME", "fallback"), "fallback");
        });
        temp_env::with_var("PLATFORM_TEST_NAME", Some("set"), || {
            assert_eq!(env_or("PLATFORM_TEST_NAME", "fallback"), "set");
        });
    }

    #[test]
    fn test_env_bool() {
        temp_env::with_var("PLATFORM_TEST_BOOL", Some("yes"), || {
            assert_eq!(env_bool("PLATFORM_TEST_BOOL", false), Ok(true));
        });
        temp_env::with_var("PLATFORM_TEST_BOOL", Some("maybe"), || {
            assert!(env_bool("PLATFORM_TEST_BOOL", false).is_err());
        });
    }

    #[test]
    fn test_env_duration_secs() {
        temp_env::with_var("PLATFORM_TEST_TTL", Some("300"), || {
            assert_eq!(
                env_duration_secs("PLATFORM_TEST_TTL", Duration::ZERO),
                Ok(Duration::from_secs(300))
            );
        });
        temp_env::with_var("PLATFORM_TEST_TTL", Some("5m"), || {
            assert!(env_duration_secs("PLATFORM_TEST_TTL", Duration::ZERO).is_err());
        });
    }

    #[test]
    fn test_env_secret_32() {
        let encoded = general_purpose::STANDARD.encode([7u8; 32]);
        temp_env::with_var("PLATFORM_TEST_SECRET", Some(encoded.as_str()), || {
            assert_eq!(env_secret_32("PLATFORM_TEST_SECRET"), Ok(Some([7u8; 32])));
        });

        let short = general_purpose::STANDARD.encode([7u8; 16]);
        temp_env::with_var("PLATFORM_TEST_SECRET", Some(short.as_str()), || {
            assert!(env_secret_32("PLATFORM_TEST_SECRET").is_err());
        });

        temp_env::with_var("PLATFORM_TEST_SECRET", None::<&str>, || {
            assert_eq!(env_secret_32("PLATFORM_TEST_SECRET"), Ok(None));
        });
    }
}
