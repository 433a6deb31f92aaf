//! Infrastructure Layer
//!
//! Store implementations and the access-token signer.

pub mod jwt;
pub mod memory;
pub mod postgres;

pub use jwt::JwtAccessTokenSigner;
pub use memory::InMemoryAuthRepository;
pub use postgres::PgAuthRepository;
