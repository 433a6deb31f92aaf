//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations with no domain knowledge:
//! - Cryptographic utilities (random tokens, SHA-256, keyed digests)
//! - Password hashing (Argon2id)
//! - Cookie management
//! - Environment-based configuration helpers

pub mod config;
pub mod cookie;
pub mod crypto;
pub mod password;
