//! Configuration management using Figment.
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//! 1. Environment variables (prefix: `MOCKHIVE_`)
//! 2. `./config.toml` in the current working directory
//! 3. Built-in defaults

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::websocket::WebSocketConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            log_level: default_log_level(),
            timeout_secs: default_timeout_secs(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

/// Fixed-window rate limiter knobs (§4.4). The per-endpoint request limit
/// itself lives on the endpoint, not here; this is only the window size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_secs: default_window_secs() }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_secs)
    }
}

/// Where per-tenant SQLite databases live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root_dir: default_storage_root() }
    }
}

impl StorageConfig {
    /// Path to a tenant's SQLite database file.
    pub fn tenant_db_path(&self, tenant: &str) -> PathBuf {
        self.root_dir.join(format!("{tenant}.sqlite3"))
    }
}

/// Internal admin surface auth (§4.8, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_secret")]
    pub shared_secret: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { shared_secret: default_admin_secret() }
    }
}

/// Tenant resolution policy (§6).
///
/// `routing` picks how the tenant slug is read off an inbound request:
/// `"path"` (default) takes the first segment under `/m/{tenant}/...`;
/// `"host"` takes the leftmost label of the `Host` header instead. Either
/// way the slug is checked against `reserved_names` before a tenant engine
/// is ever provisioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    #[serde(default = "default_reserved_names")]
    pub reserved_names: Vec<String>,
    #[serde(default = "default_tenant_routing")]
    pub routing: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self { reserved_names: default_reserved_names(), routing: default_tenant_routing() }
    }
}

impl TenantConfig {
    pub fn routes_by_host(&self) -> bool {
        self.routing.eq_ignore_ascii_case("host")
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_body_limit_mb() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/tenants")
}

fn default_admin_secret() -> String {
    "change-me".to_string()
}

fn default_reserved_names() -> Vec<String> {
    vec!["www", "api", "app", "admin", "mock"].into_iter().map(String::from).collect()
}

fn default_tenant_routing() -> String {
    "path".to_string()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// `MOCKHIVE_`-prefixed environment variables override `./config.toml`,
    /// which overrides the built-in defaults.
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration, reading the config file from a specific path.
    ///
    /// Useful for tests that want a throwaway config file rather than the
    /// working directory's `config.toml`.
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if path.exists() {
            tracing::info!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("MOCKHIVE_").split("_"));

        let config = figment.extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            storage: StorageConfig::default(),
            admin: AdminConfig::default(),
            tenant: TenantConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert!(config.tenant.reserved_names.contains(&"admin".to_string()));
    }

    #[test]
    fn load_from_missing_path_falls_back_to_defaults() {
        let config = Config::load_from_path("definitely-not-a-real-config.toml").unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
