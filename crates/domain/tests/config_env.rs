use isx_domain::config::{Config, ConfigSeverity, Environment, ServiceMode};

fn base_config() -> Config {
    Config {
        environment: Environment::Dev,
        host: "127.0.0.1".into(),
        port: 8080,
        secret_key: "0123456789abcdef0123456789abcdef".into(),
        database_url: "sqlite::memory:".into(),
        log_level: "info".into(),
        allowed_origins: vec!["http://localhost:5173".into()],
        read_timeout: std::time::Duration::from_secs(15),
        write_timeout: std::time::Duration::from_secs(15),
        idle_timeout: std::time::Duration::from_secs(60),
        max_signal_payload_size: 5 * 1024 * 1024,
        max_api_request_size: 64 * 1024,
        rate_limit_rps: 50,
        rate_limit_burst: 100,
        db_max_connections: 10,
        db_min_connections: 1,
        db_connection_lifetime: std::time::Duration::from_secs(3600),
        public_base_url: "http://localhost:8080".into(),
        service_mode: ServiceMode::All,
        schema_allowed_hosts: vec!["github.com".into(), "raw.githubusercontent.com".into()],
    }
}

fn has_error(config: &Config, var: &str) -> bool {
    config
        .validate()
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.var == var)
}

#[test]
fn valid_dev_config_passes() {
    let config = base_config();
    assert!(!config
        .validate()
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error));
}

#[test]
fn short_secret_rejected_in_prod_only() {
    let mut config = base_config();
    config.secret_key = "short".into();
    assert!(!has_error(&config, "SECRET_KEY"));

    config.environment = Environment::Prod;
    config.database_url = "postgres://db/isx?sslmode=require".into();
    config.public_base_url = "https://api.example.org".into();
    assert!(has_error(&config, "SECRET_KEY"));
}

#[test]
fn wildcard_origin_rejected_in_staging() {
    let mut config = base_config();
    config.environment = Environment::Staging;
    config.allowed_origins = vec!["*".into()];
    assert!(has_error(&config, "ALLOWED_ORIGINS"));
}

#[test]
fn prod_requires_sslmode_and_https_base() {
    let mut config = base_config();
    config.environment = Environment::Prod;
    config.database_url = "postgres://db/isx".into();
    config.public_base_url = "http://api.example.org".into();
    assert!(has_error(&config, "DATABASE_URL"));
    assert!(has_error(&config, "PUBLIC_BASE_URL"));

    config.database_url = "postgres://db/isx?sslmode=require".into();
    config.public_base_url = "https://api.example.org".into();
    assert!(!has_error(&config, "DATABASE_URL"));
    assert!(!has_error(&config, "PUBLIC_BASE_URL"));
}

#[test]
fn prod_base_url_must_not_carry_port() {
    let mut config = base_config();
    config.environment = Environment::Prod;
    config.database_url = "postgres://db/isx?sslmode=require".into();
    config.public_base_url = "https://api.example.org:8443".into();
    assert!(has_error(&config, "PUBLIC_BASE_URL"));
}

#[test]
fn non_positive_rps_disables_limiting() {
    let mut config = base_config();
    config.rate_limit_rps = 0;
    assert!(!config.rate_limit_enabled());
    assert!(!has_error(&config, "RATE_LIMIT_RPS"));
}

#[test]
fn service_mode_parses_kebab_case() {
    assert_eq!(
        "signals-read".parse::<ServiceMode>().unwrap(),
        ServiceMode::SignalsRead
    );
    assert!("bogus".parse::<ServiceMode>().is_err());
}
