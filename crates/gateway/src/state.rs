use std::sync::Arc;

use isx_auth::AuthService;
use isx_domain::Config;
use isx_store::Store;

use crate::cache::{PublicIsnCache, SchemaCache};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub auth: AuthService,
    /// Compiled JSON schemas, consulted on every signal submission.
    pub schema_cache: Arc<SchemaCache>,
    /// Startup snapshot gating the unauthenticated `/api/public` routes.
    pub public_isns: Arc<PublicIsnCache>,
    /// Outbound client for fetching signal-type schemas.
    pub http: reqwest::Client,
}
