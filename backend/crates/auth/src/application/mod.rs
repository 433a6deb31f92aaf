//! Application Layer
//!
//! Use cases and the token stores they share.

pub mod access_token_blacklist;
pub mod authenticate;
pub mod challenge_store;
pub mod config;
pub mod identity_store;
pub mod login;
pub mod logout;
pub mod prune;
pub mod refresh;
pub mod refresh_token_store;
pub mod register;
pub mod session;
pub(crate) mod store_call;
pub mod totp_setup;
pub mod update_auth_policy;
pub mod verify_two_factor;

// Re-exports
pub use access_token_blacklist::AccessTokenBlacklist;
pub use authenticate::AuthenticateUseCase;
pub use challenge_store::TwoFactorChallengeStore;
pub use config::AuthConfig;
pub use identity_store::CredentialIdentityStore;
pub use login::{LoginInput, LoginOutcome, LoginUseCase};
pub use logout::{LogoutInput, LogoutUseCase};
pub use prune::{PruneExpiredUseCase, PruneReport};
pub use refresh::{RefreshInput, RefreshUseCase};
pub use refresh_token_store::{IssuedRefreshToken, RefreshTokenStore};
pub use register::{RegisterInput, RegisterUseCase};
pub use session::AuthTokens;
pub use totp_setup::{TotpSetupOutput, TotpSetupUseCase};
pub use update_auth_policy::UpdateAuthPolicyUseCase;
pub use verify_two_factor::{VerifyTwoFactorInput, VerifyTwoFactorUseCase};
