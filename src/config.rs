use serde::Deserialize;
use std::env;

use crate::models::{BackendKind, DerivationOptions, Setting};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub default_backend: String,
    pub query_timeout_secs: u64,
    pub gateway_timeout_secs: u64,
    pub show_chart: bool,
    pub show_summary: bool,
    pub show_followups: bool,
    pub max_followups: usize,
    pub allow_mutations: bool,
}

impl PipelineConfig {
    pub fn derivation_options(&self) -> DerivationOptions {
        DerivationOptions {
            chart: self.show_chart,
            summary: self.show_summary,
            followups: self.show_followups,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

/// Connection settings for every backend. All values are optional here; the
/// connector reports which required ones are missing when a connection is
/// opened.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub snowflake: SnowflakeConfig,
    #[serde(default)]
    pub redshift: RedshiftConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub duckdb: DuckDbConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnowflakeConfig {
    pub account: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub role: Option<String>,
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedshiftConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqliteConfig {
    pub path: Option<String>,
    /// Fixed reference dataset used for validation instead of `path`
    pub validation_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DuckDbConfig {
    pub path: Option<String>,
}

impl BackendsConfig {
    /// Look up one setting for a backend. Empty strings count as missing.
    pub fn setting(&self, kind: BackendKind, setting: Setting) -> Option<String> {
        let value = match (kind, setting) {
            (BackendKind::Snowflake, Setting::Account) => self.snowflake.account.clone(),
            (BackendKind::Snowflake, Setting::User) => self.snowflake.user.clone(),
            (BackendKind::Snowflake, Setting::Password) => self.snowflake.password.clone(),
            (BackendKind::Snowflake, Setting::Warehouse) => self.snowflake.warehouse.clone(),
            (BackendKind::Snowflake, Setting::Database) => self.snowflake.database.clone(),
            (BackendKind::Snowflake, Setting::Role) => self.snowflake.role.clone(),
            (BackendKind::Snowflake, Setting::Schema) => self.snowflake.schema.clone(),
            (BackendKind::Redshift, Setting::Host) => self.redshift.host.clone(),
            (BackendKind::Redshift, Setting::Port) => self.redshift.port.map(|p| p.to_string()),
            (BackendKind::Redshift, Setting::Database) => self.redshift.database.clone(),
            (BackendKind::Redshift, Setting::User) => self.redshift.user.clone(),
            (BackendKind::Redshift, Setting::Password) => self.redshift.password.clone(),
            (BackendKind::Redshift, Setting::Schema) => self.redshift.schema.clone(),
            (BackendKind::Sqlite, Setting::Path) => self.sqlite.path.clone(),
            (BackendKind::DuckDb, Setting::Path) => self.duckdb.path.clone(),
            _ => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Required settings that are not configured for `kind`
    pub fn missing_settings(&self, kind: BackendKind) -> Vec<Setting> {
        kind.profile()
            .required_settings
            .iter()
            .copied()
            .filter(|s| self.setting(kind, *s).is_none())
            .collect()
    }

    pub fn is_configured(&self, kind: BackendKind) -> bool {
        self.missing_settings(kind).is_empty()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?
            .set_default("gateway.endpoint", "https://ask.vanna.ai/rpc")?
            .set_default("gateway.model", "chinook")?
            .set_default("gateway.timeout_secs", 60)?
            .set_default("pipeline.default_backend", "sqlite")?
            .set_default("pipeline.query_timeout_secs", 30)?
            .set_default("pipeline.gateway_timeout_secs", 60)?
            .set_default("pipeline.show_chart", true)?
            .set_default("pipeline.show_summary", true)?
            .set_default("pipeline.show_followups", true)?
            .set_default("pipeline.max_followups", 5)?
            .set_default("pipeline.allow_mutations", true)?
            .set_default("cache.enabled", true)?
            .set_default("cache.max_entries", 1000)?
            .set_default("cache.ttl_secs", 3600)?
            .set_default("backends.redshift.port", 5439)?;

        // Optional config file
        let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        builder = builder.add_source(config::File::new(&config_file, config::FileFormat::Toml).required(false));

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        if let Ok(endpoint) = env::var("VANNA_ENDPOINT") {
            builder = builder.set_override("gateway.endpoint", endpoint)?;
        }

        if let Ok(api_key) = env::var("VANNA_API_KEY") {
            builder = builder.set_override("gateway.api_key", Some(api_key))?;
        }

        if let Ok(model) = env::var("VANNA_MODEL") {
            builder = builder.set_override("gateway.model", model)?;
        }

        if let Ok(backend) = env::var("DEFAULT_BACKEND") {
            builder = builder.set_override("pipeline.default_backend", backend)?;
        }

        // Backend credentials use the same names as the deployment secrets
        for (var, key) in [
            ("SNOWFLAKE_ACCOUNT", "backends.snowflake.account"),
            ("SNOWFLAKE_USER", "backends.snowflake.user"),
            ("SNOWFLAKE_PASSWORD", "backends.snowflake.password"),
            ("SNOWFLAKE_WAREHOUSE", "backends.snowflake.warehouse"),
            ("SNOWFLAKE_DATABASE", "backends.snowflake.database"),
            ("SNOWFLAKE_ROLE", "backends.snowflake.role"),
            ("SNOWFLAKE_SCHEMA", "backends.snowflake.schema"),
            ("REDSHIFT_HOST", "backends.redshift.host"),
            ("REDSHIFT_DBNAME", "backends.redshift.database"),
            ("REDSHIFT_USER", "backends.redshift.user"),
            ("REDSHIFT_PASSWORD", "backends.redshift.password"),
            ("REDSHIFT_SCHEMA", "backends.redshift.schema"),
            ("SQLITE3_DB_PATH", "backends.sqlite.path"),
            ("SQLITE3_VALIDATION_DB_PATH", "backends.sqlite.validation_path"),
            ("DUCKDB_DB_PATH", "backends.duckdb.path"),
        ] {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        if let Ok(port) = env::var("REDSHIFT_PORT") {
            builder = builder.set_override("backends.redshift.port", port.parse::<u16>().unwrap_or(5439))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn default_backend(&self) -> BackendKind {
        self.pipeline
            .default_backend
            .parse()
            .unwrap_or(BackendKind::Sqlite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        // Clear environment variables for this test
        env::remove_var("HOST");
        env::remove_var("PORT");
        env::remove_var("DEFAULT_BACKEND");

        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pipeline.max_followups, 5);
        assert_eq!(config.default_backend(), BackendKind::Sqlite);
        assert!(config.pipeline.derivation_options().chart);
    }

    #[test]
    fn test_missing_settings_are_reported() {
        let mut backends = BackendsConfig::default();
        assert!(!backends.is_configured(BackendKind::Snowflake));
        assert!(backends
            .missing_settings(BackendKind::Snowflake)
            .contains(&Setting::Role));

        backends.sqlite.path = Some("   ".to_string());
        assert_eq!(backends.missing_settings(BackendKind::Sqlite), vec![Setting::Path]);

        backends.sqlite.path = Some("chinook.sqlite".to_string());
        assert!(backends.is_configured(BackendKind::Sqlite));
    }

    #[test]
    fn test_redshift_port_is_a_setting() {
        let mut backends = BackendsConfig::default();
        backends.redshift.port = Some(5439);
        assert_eq!(
            backends.setting(BackendKind::Redshift, Setting::Port),
            Some("5439".to_string())
        );
        assert_eq!(backends.setting(BackendKind::Sqlite, Setting::Role), None);
    }
}
