use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use isx_auth::AuthService;
use isx_domain::config::{Config, ConfigSeverity};
use isx_store::Store;

use isx_gateway::api;
use isx_gateway::cache::{PublicIsnCache, SchemaCache};
use isx_gateway::error::ApiError;
use isx_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "isxd", about = "Information Sharing Network exchange server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default).
    Serve,
    /// Configuration tools.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate the environment configuration and exit non-zero on errors.
    Validate,
    /// Print the resolved configuration with secrets redacted.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
            init_tracing(&config);
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
            let issues = config.validate();
            for issue in &issues {
                eprintln!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("configuration ok");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let mut config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
            config.secret_key = "<redacted>".into();
            config.database_url = redact_url(&config.database_url);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("isxd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .json()
        .init();
}

/// Strip credentials from a connection URL for display.
fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("<redacted>");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(
        environment = %config.environment,
        service_mode = ?config.service_mode,
        "isxd starting"
    );

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Store ────────────────────────────────────────────────────────
    let store = Store::connect(
        &config.database_url,
        config.db_max_connections,
        config.db_min_connections,
        config.db_connection_lifetime,
    )
    .await
    .context("connecting to the database")?;
    tracing::info!("store ready");

    // ── Auth service ─────────────────────────────────────────────────
    let auth = AuthService::new(store.clone(), &config.secret_key);
    tracing::info!("auth service ready");

    // ── Caches ───────────────────────────────────────────────────────
    let schema_cache = Arc::new(
        SchemaCache::load(store.clone())
            .await
            .context("loading schema cache")?,
    );
    let public_isns = Arc::new(
        PublicIsnCache::load(&store)
            .await
            .context("loading public-ISN cache")?,
    );

    // ── Outbound HTTP client (schema fetching) ───────────────────────
    let http = reqwest::Client::builder()
        .timeout(config.read_timeout)
        .build()
        .context("building HTTP client")?;

    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        auth,
        schema_cache,
        public_isns,
        http,
    };

    // ── Hourly token pruning ─────────────────────────────────────────
    {
        let store = store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3_600));
            loop {
                interval.tick().await;
                match store.prune_tokens().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(pruned = n, "expired tokens pruned"),
                    Err(e) => tracing::warn!(error = %e, "token pruning failed"),
                }
            }
        });
    }

    // ── Router ───────────────────────────────────────────────────────
    let mut app = api::router(state);

    // ── Rate-limit layer (process-wide token bucket via governor) ───
    if config.rate_limit_enabled() {
        use tower_governor::errors::GovernorError;
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::key_extractor::GlobalKeyExtractor;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_rps as u64)
            .burst_size(config.rate_limit_burst)
            .key_extractor(GlobalKeyExtractor)
            .error_handler(|err| match err {
                GovernorError::TooManyRequests { .. } => {
                    axum::response::IntoResponse::into_response(ApiError::RateLimited)
                }
                other => axum::response::IntoResponse::into_response(ApiError::Internal(
                    other.to_string(),
                )),
            })
            .finish()
            .context("invalid rate limit configuration")?;

        tracing::info!(
            requests_per_second = config.rate_limit_rps,
            burst_size = config.rate_limit_burst,
            "rate limiting enabled"
        );
        app = app.layer(GovernorLayer {
            config: Arc::new(gov_config),
        });
    } else {
        tracing::info!("rate limiting disabled (RATE_LIMIT_RPS <= 0)");
    }

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "isxd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // In-flight requests have drained; release the pool.
    store.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining requests");
}
