use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub docs: DocsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }

        let level = self.logging.level.to_ascii_lowercase();
        let allowed = ["trace", "debug", "info", "warn", "error", "off"];
        if !allowed.contains(&level.as_str()) {
            return Err(format!(
                "logging.level must be one of {allowed:?}, got '{}'",
                self.logging.level
            ));
        }

        if self.categories.fetch_timeout_ms == 0 {
            return Err("categories.fetch_timeout_ms must be > 0".into());
        }
        if self.categories.trust_category_header
            && self.categories.category_header.trim().is_empty()
        {
            return Err(
                "categories.category_header must be set when trust_category_header is enabled"
                    .into(),
            );
        }
        if self.categories.watch && self.categories.store_path.is_none() {
            return Err("categories.watch requires categories.store_path".into());
        }

        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::from((ip, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Category configuration source and caller resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesConfig {
    /// JSON or TOML file of category records. When unset the store is empty
    /// and the built-in categories are served.
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Periodic refresh in seconds; 0 disables it.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Reload when `store_path` changes on disk.
    #[serde(default)]
    pub watch: bool,
    /// Accept the caller category from `category_header`.
    ///
    /// Only enable this behind a gateway that sets or strips the header.
    #[serde(default)]
    pub trust_category_header: bool,
    #[serde(default = "default_category_header")]
    pub category_header: String,
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}
fn default_category_header() -> String {
    "x-api-category".into()
}

impl CategoriesConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            refresh_interval_secs: 0,
            watch: false,
            trust_category_header: false,
            category_header: default_category_header(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    #[serde(default = "default_docs_enabled")]
    pub enabled: bool,
    /// Pre-built OpenAPI JSON document served per category.
    #[serde(default)]
    pub document_path: Option<String>,
}

fn default_docs_enabled() -> bool {
    true
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: default_docs_enabled(),
            document_path: None,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("gigameter.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., GIGAMETER__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("GIGAMETER")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
