//! Credential Entity
//!
//! Secret authentication data for a user, kept apart from [`User`]:
//! - Argon2id password hash
//! - TOTP secret and enrolment flag
//! - Failed-attempt counter and lockout deadline
//!
//! [`User`]: super::user::User

use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::password::HashedPassword;

use crate::domain::value_object::totp_secret::TotpSecret;

/// Lockout policy of the identity store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Result of reserving a password attempt before the password is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptReservation {
    /// Counted as a failure until the password is found correct.
    /// `locks_account` is set on the attempt that reached the threshold.
    Granted { locks_account: bool },
    /// Refused without looking at the password
    Locked { retry_after: Duration },
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: UserId,
    pub password_hash: HashedPassword,
    pub totp_secret: Option<TotpSecret>,
    /// True once the secret has been confirmed with a valid code
    pub totp_enabled: bool,
    pub failed_attempts: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(user_id: UserId, password_hash: HashedPassword) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            password_hash,
            totp_secret: None,
            totp_enabled: false,
            failed_attempts: 0,
            last_failed_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining lockout at `now`, if the account is locked
    pub fn lockout_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .and_then(|until| (until - now).to_std().ok())
    }

    /// Reserve a password attempt at `now`.
    ///
    /// The attempt counts as a failure until a correct password resets the
    /// counter. Reaching the threshold locks the account and restarts the
    /// counter.
    pub fn reserve_attempt(&mut self, policy: &LockoutPolicy, now: DateTime<Utc>) -> AttemptReservation {
        if let Some(retry_after) = self.lockout_remaining(now) {
            return AttemptReservation::Locked { retry_after };
        }

        self.failed_attempts += 1;
        self.last_failed_at = Some(now);
        self.updated_at = now;

        if self.failed_attempts >= policy.max_failed_attempts {
            let duration = chrono::Duration::from_std(policy.lockout_duration)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
            self.locked_until = Some(now + duration);
            self.failed_attempts = 0;
            return AttemptReservation::Granted {
                locks_account: true,
            };
        }

        self.locked_until = None;
        AttemptReservation::Granted {
            locks_account: false,
        }
    }

    /// Clear the failure counter after a correct password. A lockout is only
    /// lifted by the attempt that set it.
    pub fn reset_failures(&mut self, clear_lockout: bool) {
        self.failed_attempts = 0;
        self.last_failed_at = None;
        if clear_lockout {
            self.locked_until = None;
        }
        self.updated_at = Utc::now();
    }

    /// Start enrolment with a new secret (not active until confirmed)
    pub fn setup_totp(&mut self) -> TotpSecret {
        let secret = TotpSecret::generate();
        self.totp_secret = Some(secret.clone());
        self.totp_enabled = false;
        self.updated_at = Utc::now();
        secret
    }

    pub fn enable_totp(&mut self) {
        if self.totp_secret.is_some() {
            self.totp_enabled = true;
            self.updated_at = Utc::now();
        }
    }

    pub fn disable_totp(&mut self) {
        self.totp_secret = None;
        self.totp_enabled = false;
        self.updated_at = Utc::now();
    }

    pub fn two_factor_enabled(&self) -> bool {
        self.totp_enabled && self.totp_secret.is_some()
    }
}
