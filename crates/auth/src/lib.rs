//! Identity and credentials: password hashing, JWT access tokens with
//! embedded ISN permissions, rotating refresh tokens with reuse detection,
//! and service-account client credentials.

mod error;
mod jwt;
mod password;
mod service;
mod tokens;

pub use error::{AuthError, Result};
pub use jwt::{Claims, IsnPermClaim, TokenVerifier, ACCESS_TOKEN_TTL, TOKEN_ISSUER};
pub use password::MIN_PASSWORD_LEN;
pub use service::{AuthService, IssuedSecret, Session};
pub use tokens::REFRESH_TOKEN_TTL;
