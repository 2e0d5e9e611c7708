//! Service configuration.
//!
//! Values are resolved in three layers: built-in defaults, then `WARDEN_*`
//! environment variables, then the YAML file named by `WARDEN_CONFIG`.
use crate::api::types::Permission;
use crate::store::postgres::is_sql_identifier;
use anyhow::{Context, Result, bail};
use axum::http::HeaderName;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9090";
pub const DEFAULT_API_ROUTE: &str = "/admin/access-control";
pub const DEFAULT_DB_NAME: &str = "access_control_db";
pub const DEFAULT_COLLECTION_NAME: &str = "policy_rules";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            connect_timeout_ms: default_timeout_ms(),
            acquire_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Access-control settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccessControlConfig {
    /// Base path of the permission API.
    pub api_route: String,
    /// Guard the permission API with the request guard itself.
    pub protect_api: bool,
    /// Postgres database holding the rule table.
    pub db_name: String,
    /// Rule table name.
    pub collection_name: String,
    /// Model file; the built-in model is used when unset.
    pub model: Option<PathBuf>,
    /// Headers identifying an owner (admin) caller, checked first.
    pub owner_headers: Vec<String>,
    /// Headers identifying a regular caller.
    pub user_headers: Vec<String>,
    /// Rules created at startup.
    pub seed: Vec<Permission>,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            api_route: DEFAULT_API_ROUTE.to_string(),
            protect_api: true,
            db_name: DEFAULT_DB_NAME.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            model: None,
            owner_headers: Vec::new(),
            user_headers: vec!["X-User".to_string()],
            seed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub log: LogConfig,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub access_control: AccessControlConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize)]
struct WardenConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    log: Option<LogConfig>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    access_control: Option<AccessControlConfig>,
    cors: Option<CorsConfig>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            metrics_bind: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log: LogConfig::default(),
            storage: StorageBackend::Memory,
            postgres: None,
            access_control: AccessControlConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl WardenConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.bind_addr = std::env::var("WARDEN_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse WARDEN_BIND")?;
        config.metrics_bind = std::env::var("WARDEN_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse WARDEN_METRICS_BIND")?;
        if let Ok(value) = std::env::var("WARDEN_STORAGE") {
            config.storage = value.parse().with_context(|| "parse WARDEN_STORAGE")?;
        }
        if let Ok(url) = std::env::var("WARDEN_POSTGRES_URL") {
            config.postgres = Some(PostgresConfig::from_url(url));
        }
        if let Ok(level) = std::env::var("WARDEN_LOG") {
            config.log.level = level;
        }
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overlay the sections present in a YAML document.
    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: WardenConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse warden config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.log {
            self.log = value;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.access_control {
            self.access_control = value;
        }
        if let Some(value) = override_cfg.cors {
            self.cors = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let access = &self.access_control;
        if !access.api_route.starts_with('/') || access.api_route.ends_with('/') {
            bail!(
                "access_control.api_route must start with '/' and must not end with '/': {}",
                access.api_route
            );
        }
        for name in access.owner_headers.iter().chain(&access.user_headers) {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid identity header name: {name}"))?;
        }
        if !is_sql_identifier(&access.collection_name) {
            bail!(
                "access_control.collection_name is not a valid table name: {}",
                access.collection_name
            );
        }
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("postgres configuration missing");
        }
        Ok(())
    }
}
