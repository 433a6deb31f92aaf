//! User Entity
//!
//! Account identity and authorization data. Secrets live in
//! [`Credential`](super::credential::Credential).

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::value_object::email::Email;

/// Role that may manage client policies
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub email: Email,
    pub email_verified: bool,
    /// Role names carried into access tokens
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: Email) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::new(),
            email,
            email_verified: false,
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}
