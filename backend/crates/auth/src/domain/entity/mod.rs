//! Entity Module

pub mod blacklist_entry;
pub mod client;
pub mod credential;
pub mod refresh_token;
pub mod two_factor_challenge;
pub mod user;
