//! Two-Factor Challenge Entity
//!
//! Binds a login that passed the password check to a user and client until
//! the second factor is presented. Only the keyed digest of the challenge
//! token is stored.

use chrono::{DateTime, Utc};
use kernel::id::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorChallenge {
    /// Hex HMAC-SHA256 of the challenge token
    pub token_hash: String,
    pub user_id: UserId,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TwoFactorChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
