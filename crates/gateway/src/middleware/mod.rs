//! The middleware chain: auth guards, security headers, request-size caps,
//! and request logging. Request-id propagation, tracing, CORS, timeouts,
//! and the process-wide rate limit are tower-http / tower_governor layers
//! wired up in the router.

pub mod guards;
pub mod headers;
pub mod limits;
pub mod logging;

pub use guards::{ensure_isn_permission, require_dev_env, require_valid_token, AdminGuard, Authenticated, OwnerGuard};
