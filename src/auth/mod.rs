pub mod cookies;
pub mod identity;
pub mod jwt;
pub mod password;

pub use identity::{AuthenticatedIdentity, IdentityChain, IdentityResolver, IdentitySource};
pub use jwt::TokenSigner;
pub use password::{hash_password, verify_password};
