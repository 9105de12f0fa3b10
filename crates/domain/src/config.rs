//! Process configuration, read from the environment.
//!
//! `Config::from_env()` parses every variable; `Config::validate()` applies
//! the environment-dependent rules (secret length, sslmode, wildcard CORS,
//! https base URL). Startup aborts when validation reports any `Error`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment / service mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    Perf,
    Staging,
    Prod,
}

impl Environment {
    /// Staging and prod share the hardened validation rules.
    pub fn is_hardened(self) -> bool {
        matches!(self, Environment::Staging | Environment::Prod)
    }

    /// Dev and test may mount destructive endpoints.
    pub fn is_dev_like(self) -> bool {
        matches!(self, Environment::Dev | Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "test" => Ok(Environment::Test),
            "perf" => Ok(Environment::Perf),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(format!(
                "unknown environment {other:?} (expected dev|test|perf|staging|prod)"
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Perf => "perf",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        };
        f.write_str(s)
    }
}

/// Which route groups the process mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceMode {
    All,
    Api,
    Admin,
    Signals,
    SignalsRead,
    SignalsWrite,
}

impl ServiceMode {
    pub fn mounts_auth(self) -> bool {
        matches!(self, ServiceMode::All | ServiceMode::Api | ServiceMode::Admin)
    }

    pub fn mounts_admin(self) -> bool {
        matches!(self, ServiceMode::All | ServiceMode::Api | ServiceMode::Admin)
    }

    pub fn mounts_signal_read(self) -> bool {
        matches!(
            self,
            ServiceMode::All | ServiceMode::Signals | ServiceMode::SignalsRead
        )
    }

    pub fn mounts_signal_write(self) -> bool {
        matches!(
            self,
            ServiceMode::All | ServiceMode::Signals | ServiceMode::SignalsWrite
        )
    }
}

impl FromStr for ServiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ServiceMode::All),
            "api" => Ok(ServiceMode::Api),
            "admin" => Ok(ServiceMode::Admin),
            "signals" => Ok(ServiceMode::Signals),
            "signals-read" => Ok(ServiceMode::SignalsRead),
            "signals-write" => Ok(ServiceMode::SignalsWrite),
            other => Err(format!(
                "unknown service mode {other:?} (expected all|api|admin|signals|signals-read|signals-write)"
            )),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub secret_key: String,
    pub database_url: String,
    pub log_level: String,
    /// Origins allowed on the protected CORS policy (`ALLOWED_ORIGINS`,
    /// pipe-separated). `["*"]` is rejected by validation in staging/prod.
    pub allowed_origins: Vec<String>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    /// Body cap for signal submission routes (bytes).
    pub max_signal_payload_size: usize,
    /// Body cap for all other API routes (bytes).
    pub max_api_request_size: usize,
    /// Process-wide rate limit. Zero or negative disables limiting.
    pub rate_limit_rps: i64,
    pub rate_limit_burst: u32,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_connection_lifetime: Duration,
    pub public_base_url: String,
    pub service_mode: ServiceMode,
    /// Hosts signal-type schemas may be fetched from
    /// (`SCHEMA_ALLOWED_HOSTS`, pipe-separated).
    pub schema_allowed_hosts: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigIssue> {
        Ok(Config {
            environment: parse_var("ENVIRONMENT", "dev")?,
            host: string_var("HOST", "0.0.0.0"),
            port: parse_var("PORT", "8080")?,
            secret_key: string_var("SECRET_KEY", ""),
            database_url: string_var("DATABASE_URL", ""),
            log_level: string_var("LOG_LEVEL", "info"),
            allowed_origins: string_var("ALLOWED_ORIGINS", "*")
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            read_timeout: secs_var("READ_TIMEOUT_SECS", 15)?,
            write_timeout: secs_var("WRITE_TIMEOUT_SECS", 15)?,
            idle_timeout: secs_var("IDLE_TIMEOUT_SECS", 60)?,
            max_signal_payload_size: parse_var("MAX_SIGNAL_PAYLOAD_SIZE", "5242880")?,
            max_api_request_size: parse_var("MAX_API_REQUEST_SIZE", "65536")?,
            rate_limit_rps: parse_var("RATE_LIMIT_RPS", "50")?,
            rate_limit_burst: parse_var("RATE_LIMIT_BURST", "100")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
            db_connection_lifetime: secs_var("DB_CONNECTION_LIFETIME_SECS", 3_600)?,
            public_base_url: string_var("PUBLIC_BASE_URL", "http://localhost:8080"),
            service_mode: parse_var("SERVICE_MODE", "all")?,
            schema_allowed_hosts: string_var(
                "SCHEMA_ALLOWED_HOSTS",
                "github.com|raw.githubusercontent.com",
            )
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        })
    }

    /// Apply the environment-dependent rules. The caller aborts startup when
    /// any returned issue has `Error` severity.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.port == 0 {
            issues.push(ConfigIssue::error("PORT", "must be between 1 and 65535"));
        }

        if self.secret_key.is_empty() {
            issues.push(ConfigIssue::error("SECRET_KEY", "must be set"));
        } else if self.environment.is_hardened() && self.secret_key.len() < 32 {
            issues.push(ConfigIssue::error(
                "SECRET_KEY",
                "must be at least 32 characters in staging/prod",
            ));
        }

        if self.database_url.is_empty() {
            issues.push(ConfigIssue::error("DATABASE_URL", "must be set"));
        } else if self.environment == Environment::Prod
            && !self.database_url.contains("sslmode=require")
            && !self.database_url.contains("sslmode=verify")
        {
            issues.push(ConfigIssue::error(
                "DATABASE_URL",
                "must require TLS (sslmode=require or sslmode=verify-*) in prod",
            ));
        }

        if self.environment.is_hardened()
            && self.allowed_origins.iter().any(|o| o == "*")
        {
            issues.push(ConfigIssue::error(
                "ALLOWED_ORIGINS",
                "wildcard origin is forbidden in staging/prod",
            ));
        }

        if self.environment == Environment::Prod {
            if !self.public_base_url.starts_with("https://") {
                issues.push(ConfigIssue::error(
                    "PUBLIC_BASE_URL",
                    "must be https in prod",
                ));
            } else if self.public_base_url.rsplit("//").next().is_some_and(|rest| {
                rest.split('/').next().is_some_and(|host| host.contains(':'))
            }) {
                issues.push(ConfigIssue::error(
                    "PUBLIC_BASE_URL",
                    "must not carry an explicit port in prod",
                ));
            }
        }

        if self.db_min_connections > self.db_max_connections {
            issues.push(ConfigIssue::error(
                "DB_MIN_CONNECTIONS",
                "must not exceed DB_MAX_CONNECTIONS",
            ));
        }

        if self.rate_limit_rps <= 0 {
            issues.push(ConfigIssue::warning(
                "RATE_LIMIT_RPS",
                "rate limiting disabled",
            ));
        }

        issues
    }

    /// Rate limiting is enabled only for a positive RPS.
    pub fn rate_limit_enabled(&self) -> bool {
        self.rate_limit_rps > 0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration issue, tagged with the variable it concerns.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub var: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(var: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            var: var.into(),
            message: message.into(),
        }
    }

    pub fn warning(var: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            var: var.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.var, self.message)
    }
}

impl std::error::Error for ConfigIssue {}

// ── env helpers ─────────────────────────────────────────────────────

fn string_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigIssue>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = string_var(name, default);
    raw.parse::<T>()
        .map_err(|e| ConfigIssue::error(name, format!("invalid value {raw:?}: {e}")))
}

fn secs_var(name: &str, default: u64) -> Result<Duration, ConfigIssue> {
    let raw = string_var(name, &default.to_string());
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigIssue::error(name, format!("invalid value {raw:?}: {e}")))
}
