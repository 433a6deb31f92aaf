//! Access Token Blacklist Entry

use chrono::{DateTime, Utc};
use kernel::id::UserId;

/// Access token invalidated before its natural expiry.
///
/// `expires_at` is the token's own `exp`; the entry can be pruned after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub token_hash: String,
    pub user_id: UserId,
    pub blacklisted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
