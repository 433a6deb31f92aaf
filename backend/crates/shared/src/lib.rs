//! Shared Kernel
//!
//! The smallest vocabulary shared by every crate in the workspace:
//! - Error classification and the unified [`error::app_error::AppError`]
//! - Typed UUID identifiers
//!
//! Anything with a domain-specific meaning belongs in the owning crate.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
