use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_DECIMAL_PLACES: u32 = 2;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const CONFIG_DIR: &str = "config";

/// Connection settings for the peer instance BOMs can be imported from.
///
/// Remote import is disabled unless every field is filled in.
#[derive(Clone, Deserialize, Validate)]
pub struct RemotePeerConfig {
    #[serde(default)]
    #[validate(url)]
    pub url: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_remote_timeout")]
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

impl RemotePeerConfig {
    pub fn is_complete(&self) -> bool {
        [&self.url, &self.database, &self.user, &self.password]
            .iter()
            .all(|field| field.as_deref().map_or(false, |v| !v.trim().is_empty()))
    }
}

impl Default for RemotePeerConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: None,
            user: None,
            password: None,
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for RemotePeerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePeerConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Engine configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    #[validate(length(min = 1))]
    pub database_url: String,

    /// Currency every normalized price is expressed in
    #[serde(default = "default_company_currency")]
    #[validate(custom = "validate_currency_code")]
    pub company_currency: String,

    /// Rounding applied to currency amounts
    #[serde(default = "default_decimal_places")]
    #[validate(range(max = 10))]
    pub currency_decimal_places: u32,

    #[serde(default)]
    #[validate]
    pub remote: RemotePeerConfig,
}

impl AppConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            database_url: database_url.into(),
            company_currency: DEFAULT_CURRENCY.to_string(),
            currency_decimal_places: DEFAULT_DECIMAL_PLACES,
            remote: RemotePeerConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_company_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_decimal_places() -> u32 {
    DEFAULT_DECIMAL_PLACES
}

fn default_remote_timeout() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("company_currency");
        err.message = Some("Must be a three letter ISO 4217 code, e.g. EUR".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter.
///
/// `RUST_LOG` overrides the level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("project_bom={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads configuration from `config/` in the working directory.
///
/// Layers sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. Environment variables (`APP__*`, e.g. `APP__REMOTE__URL`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://project_bom.db?mode=rwc")?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("company_currency", DEFAULT_CURRENCY)?
        .set_default("currency_decimal_places", i64::from(DEFAULT_DECIMAL_PLACES))?
        .set_default("remote.timeout_secs", DEFAULT_REMOTE_TIMEOUT_SECS as i64)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if !app_config.remote.is_complete() {
        warn!("Remote peer settings incomplete; remote BOM import is disabled");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().join("missing"), "test").unwrap();
        assert_eq!(cfg.environment, "test");
        assert_eq!(cfg.company_currency, "EUR");
        assert_eq!(cfg.currency_decimal_places, 2);
        assert!(!cfg.remote.is_complete());
    }

    #[test]
    fn environment_file_overrides_default_file() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
            company_currency = "USD"
            log_level = "debug"
            "#,
        );
        write_config(
            &dir,
            "staging.toml",
            r#"
            company_currency = "GBP"

            [remote]
            url = "https://peer.example.com"
            database = "peer"
            user = "admin"
            password = "secret"
            "#,
        );

        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.company_currency, "GBP");
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.remote.is_complete());
        assert_eq!(cfg.remote.timeout_secs, 30);
    }

    #[test]
    fn invalid_currency_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "default.toml", r#"company_currency = "euro""#);
        let err = load_config_from(dir.path(), "test").unwrap_err();
        assert!(matches!(err, AppConfigError::Validation(_)));
    }

    #[test]
    fn remote_config_with_blank_field_is_incomplete() {
        let remote = RemotePeerConfig {
            url: Some("https://peer.example.com".into()),
            database: Some("peer".into()),
            user: Some(" ".into()),
            password: Some("secret".into()),
            timeout_secs: 30,
        };
        assert!(!remote.is_complete());
    }

    #[test]
    fn debug_output_hides_password() {
        let remote = RemotePeerConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", remote).contains("hunter2"));
    }
}
