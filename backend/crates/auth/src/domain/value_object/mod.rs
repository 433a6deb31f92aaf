//! Value Object Module

pub mod auth_policy;
pub mod email;
pub mod totp_secret;
