use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_INBOX_UNIT_PRICE_CENTS: i64 = 3000;
const DEFAULT_FULFILLMENT_TIMEOUT_SECS: u64 = 30;

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Host address to bind the HTTP server to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment: development, test, production
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter passed to tracing-subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared secret for payment-gateway webhook signatures. When unset,
    /// signature verification is skipped (local development only).
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Allowed clock skew between the signed timestamp and now
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    /// Price per purchased inbox; order totals are quantity × this value
    #[validate(range(min = 1, message = "Unit price must be positive"))]
    #[serde(default = "default_inbox_unit_price_cents")]
    pub inbox_unit_price_cents: i64,

    /// Upper bound on a single fulfillment transaction; expiry surfaces
    /// as a retryable 503
    #[serde(default = "default_fulfillment_timeout_secs")]
    pub fulfillment_timeout_secs: u64,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_inbox_unit_price_cents() -> i64 {
    DEFAULT_INBOX_UNIT_PRICE_CENTS
}
fn default_fulfillment_timeout_secs() -> u64 {
    DEFAULT_FULFILLMENT_TIMEOUT_SECS
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

impl AppConfig {
    /// Programmatic constructor used by the test harness.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            inbox_unit_price_cents: default_inbox_unit_price_cents(),
            fulfillment_timeout_secs: default_fulfillment_timeout_secs(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// An unset webhook secret disables signature verification, which is
    /// acceptable only outside production.
    pub fn ensure_webhook_secret(&self) -> Result<(), ConfigError> {
        if self.is_production() && self.payment_webhook_secret.is_none() {
            return Err(ConfigError::Message(
                "payment_webhook_secret is required in production".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration from layered sources: `config/default.toml`, an
/// environment-specific `config/<env>.toml`, and `APP_`-prefixed
/// environment variables (highest precedence).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    let env_path = Path::new(CONFIG_DIR).join(format!("{}.toml", environment));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let settings = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment.clone())?
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("Configuration validation failed: {}", e)))?;
    app_config.ensure_webhook_secret()?;

    info!(
        environment = %app_config.environment,
        port = app_config.port,
        "Configuration loaded"
    );

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmatic_config_is_valid() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            18080,
            "test".into(),
        );
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bind_address(), "127.0.0.1:18080");
        assert!(!cfg.is_production());
    }

    #[test]
    fn production_requires_a_webhook_secret() {
        let mut cfg = AppConfig::new(
            "postgres://localhost/sendstack".into(),
            "0.0.0.0".into(),
            8080,
            "production".into(),
        );
        assert!(cfg.ensure_webhook_secret().is_err());

        cfg.payment_webhook_secret = Some("whsec_live".into());
        assert!(cfg.ensure_webhook_secret().is_ok());

        // Development keeps the unset-secret affordance.
        cfg.environment = "development".into();
        cfg.payment_webhook_secret = None;
        assert!(cfg.ensure_webhook_secret().is_ok());
    }

    #[test]
    fn unit_price_must_be_positive() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            18080,
            "test".into(),
        );
        cfg.inbox_unit_price_cents = 0;
        assert!(cfg.validate().is_err());
    }
}
