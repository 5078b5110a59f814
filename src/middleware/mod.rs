pub mod auth;

pub use auth::{authenticate, authorize, create_token, verify_token, Bearer, Claims, JwtConfig};
