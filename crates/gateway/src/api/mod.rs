//! Router assembly.
//!
//! Route groups are mounted according to `SERVICE_MODE`, each behind its
//! own slice of the middleware chain: request-id + tracing + logging +
//! security headers + timeout globally, CORS and body caps per group, auth
//! guards on protected groups, and the process-wide rate limit stacked on
//! top in `main`.

pub mod accounts;
pub mod auth;
pub mod batches;
pub mod dev;
pub mod health;
pub mod isn;
pub mod oauth;
pub mod search;
pub mod signal_types;
pub mod signals;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use isx_domain::sem_ver::parse_sem_ver;
use isx_domain::Config;

use crate::error::ApiError;
use crate::middleware::{guards, headers, limits, logging};
use crate::state::AppState;

/// JSON body extractor whose rejection renders the standard error shape
/// (`{error_code: "malformed_body", ...}`) instead of axum's default.
#[derive(axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// Parse the `v{sem_ver}` path segment. A malformed segment cannot match
/// any signal type, so it is a 404 rather than a 400.
pub(crate) fn parse_version_segment(segment: &str) -> Result<String, ApiError> {
    segment
        .strip_prefix('v')
        .and_then(|raw| parse_sem_ver(raw).ok().map(|_| raw.to_string()))
        .ok_or_else(|| ApiError::NotFound(format!("no signal type version {segment:?}")))
}

/// Build the full router for the configured service mode.
pub fn router(state: AppState) -> Router {
    let mode = state.config.service_mode;
    let protected_cors = build_protected_cors(&state.config);
    let public_cors = build_public_cors();

    let mut app = Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready));

    if mode.mounts_auth() {
        app = app.merge(auth_routes(&state, protected_cors.clone()));
    }
    if mode.mounts_admin() {
        app = app.merge(admin_routes(&state, protected_cors.clone()));
    }
    if mode.mounts_signal_write() {
        app = app.merge(signal_write_routes(&state, protected_cors.clone()));
    }
    if mode.mounts_signal_read() {
        app = app.merge(signal_read_routes(&state, protected_cors, public_cors));
    }

    app.layer(from_fn_with_state(state.clone(), headers::security_headers))
        .layer(from_fn(logging::log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TimeoutLayer::new(state.config.write_timeout))
        .with_state(state)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Route groups
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Credential endpoints: reachable without an access token.
fn auth_routes(state: &AppState, cors: CorsLayer) -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/auth/password-reset/request",
            post(auth::password_reset_request),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(auth::password_reset_confirm),
        )
        .route("/oauth/token", post(oauth::token))
        .route("/oauth/revoke", post(oauth::revoke))
        .layer(from_fn_with_state(state.clone(), limits::limit_api_body))
        .layer(DefaultBodyLimit::max(state.config.max_api_request_size))
        .layer(cors)
}

/// ISN / signal-type / account management. All token-guarded.
fn admin_routes(state: &AppState, cors: CorsLayer) -> Router<AppState> {
    let mut router = Router::new()
        .route("/api/isn", post(isn::create_isn).get(isn::list_isns))
        .route("/api/isn/:isn_slug", put(isn::update_isn).get(isn::get_isn))
        .route("/api/isn/:isn_slug/transfer", put(isn::transfer_isn))
        .route(
            "/api/isn/:isn_slug/permissions",
            post(isn::grant_permission).delete(isn::revoke_permission),
        )
        .route(
            "/api/isn/:isn_slug/signal_types",
            post(signal_types::create_signal_type).get(signal_types::list_signal_types),
        )
        .route(
            "/api/isn/:isn_slug/signal_types/:signal_type_slug/:sem_ver",
            put(signal_types::update_signal_type),
        )
        .route("/api/accounts", get(accounts::list_accounts))
        .route(
            "/api/accounts/:account_id/status",
            put(accounts::set_account_status),
        )
        .route(
            "/api/accounts/:account_id/role",
            put(accounts::set_account_role),
        )
        .route(
            "/api/service-accounts",
            post(accounts::create_service_account),
        )
        .route(
            "/api/service-accounts/:client_id/rotate-secret",
            post(accounts::rotate_client_secret),
        );

    if state.config.environment.is_dev_like() {
        router = router.merge(
            Router::new()
                .route("/api/dev/reset", delete(dev::reset))
                .route_layer(from_fn_with_state(state.clone(), guards::require_dev_env)),
        );
    }

    router
        .route_layer(from_fn_with_state(state.clone(), guards::require_valid_token))
        .layer(from_fn_with_state(state.clone(), limits::limit_api_body))
        .layer(DefaultBodyLimit::max(state.config.max_api_request_size))
        .layer(cors)
}

/// Signal submission, withdrawal, and batch management. The larger signal
/// body cap applies here.
fn signal_write_routes(state: &AppState, cors: CorsLayer) -> Router<AppState> {
    Router::new()
        .route(
            "/api/isn/:isn_slug/signal_types/:signal_type_slug/:sem_ver/signals",
            post(signals::submit_signals),
        )
        .route(
            "/api/isn/:isn_slug/signal_types/:signal_type_slug/:sem_ver/signals/withdraw",
            put(signals::withdraw_signal),
        )
        .route("/api/isn/:isn_slug/batches", post(batches::create_batch))
        .route(
            "/api/isn/:isn_slug/batches/latest",
            get(batches::latest_batch),
        )
        .route_layer(from_fn_with_state(state.clone(), guards::require_valid_token))
        .layer(from_fn_with_state(state.clone(), limits::limit_signal_body))
        .layer(DefaultBodyLimit::max(state.config.max_signal_payload_size))
        .layer(cors)
}

/// Private search (token-guarded) and the unauthenticated public mirror.
fn signal_read_routes(
    state: &AppState,
    protected_cors: CorsLayer,
    public_cors: CorsLayer,
) -> Router<AppState> {
    let private = Router::new()
        .route(
            "/api/isn/:isn_slug/signal_types/:signal_type_slug/:sem_ver/signals/search",
            get(search::search_private),
        )
        .route_layer(from_fn_with_state(state.clone(), guards::require_valid_token))
        .layer(protected_cors);

    let public = Router::new()
        .route(
            "/api/public/isn/:isn_slug/signal_types/:signal_type_slug/:sem_ver/signals/search",
            get(search::search_public),
        )
        .layer(public_cors);

    private.merge(public)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CORS policies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Unauthenticated read surface: any origin, read-only methods.
fn build_public_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Protected surface: configured origins, full methods, credentialed.
/// Config validation rejects the wildcard in staging/prod; in dev a
/// wildcard falls back to permissive CORS without credentials.
fn build_protected_cors(config: &Config) -> CorsLayer {
    if config.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %o, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
