//! OAuth Client Entity

use crate::domain::value_object::auth_policy::AuthPolicy;

/// Registered application with its own authentication policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    /// Schemaless JSON properties; the policy lives under `authPolicy`
    pub properties: Option<String>,
    pub is_active: bool,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, properties: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            properties,
            is_active: true,
        }
    }

    /// Policy embedded in the properties blob, or the default policy
    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy::resolve(self.properties.as_deref())
    }
}
