//! Refresh Token Entity
//!
//! One record per issued refresh token. Records are never reactivated:
//! rotation marks the presented record revoked and points it at its
//! successor, which is how a replayed token is told apart from one that was
//! simply revoked.

use chrono::{DateTime, Utc};
use kernel::id::{SessionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// Hex HMAC-SHA256 of the plaintext token
    pub token_hash: String,
    pub user_id: UserId,
    /// Login session shared by every token rotated from the same login
    pub session_id: SessionId,
    pub client_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Digest of the token this one was rotated into
    pub replaced_by: Option<String>,
}

impl RefreshToken {
    pub fn new(
        token_hash: String,
        user_id: UserId,
        session_id: SessionId,
        client_id: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_hash,
            user_id,
            session_id,
            client_id,
            issued_at,
            expires_at,
            revoked: false,
            revoked_at: None,
            replaced_by: None,
        }
    }

    /// Non-revoked and unexpired at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }

    /// Revoked because it was rotated (presenting it again is reuse)
    pub fn was_rotated(&self) -> bool {
        self.revoked && self.replaced_by.is_some()
    }

    /// Successor inheriting this token's user, session and client
    pub fn successor(
        &self,
        token_hash: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            token_hash,
            self.user_id,
            self.session_id,
            self.client_id.clone(),
            issued_at,
            expires_at,
        )
    }

    pub fn mark_rotated(&mut self, successor_hash: &str, now: DateTime<Utc>) {
        self.revoked = true;
        self.revoked_at = Some(now);
        self.replaced_by = Some(successor_hash.to_string());
    }

    /// Idempotent; keeps the original revocation time
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        if !self.revoked {
            self.revoked = true;
            self.revoked_at = Some(now);
        }
    }
}

/// Outcome of presenting a refresh token for one-time use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Token was active and is now spent (for rotation: the stored successor)
    Consumed(RefreshToken),
    /// Token had already been rotated away
    Reused(RefreshToken),
    /// Unknown, expired, revoked, or bound to a different user or session
    Invalid,
}

/// Rotation request: the presented digest and the successor to store
#[derive(Debug, Clone)]
pub struct RefreshTokenRotation {
    pub presented_hash: String,
    pub successor_hash: String,
    /// Session the presented token must belong to
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(now: DateTime<Utc>) -> RefreshToken {
        RefreshToken::new(
            "aa".into(),
            UserId::new(),
            SessionId::new(),
            "web".into(),
            now,
            now + chrono::Duration::days(1),
        )
    }

    #[test]
    fn test_rotation_marks_reuse() {
        let now = Utc::now();
        let mut old = token(now);
        let next = old.successor("bb".into(), now, now + chrono::Duration::days(1));
        old.mark_rotated(&next.token_hash, now);

        assert!(!old.is_active(now));
        assert!(old.was_rotated());
        assert_eq!(next.session_id, old.session_id);
        assert!(next.is_active(now));
    }

    #[test]
    fn test_plain_revocation_is_not_rotation() {
        let now = Utc::now();
        let mut t = token(now);
        t.revoke(now);
        t.revoke(now + chrono::Duration::seconds(5));

        assert!(!t.was_rotated());
        assert_eq!(t.revoked_at, Some(now));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let t = token(now);
        assert!(!t.is_active(now + chrono::Duration::days(2)));
    }
}
