use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use warden_auth::WardenConfig;
use warden_auth_postgres::PostgresConfig;

/// DSN selecting the in-memory backend.
pub const MEMORY_DSN: &str = "memory";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Authorization core configuration
    #[serde(default)]
    pub auth: WardenConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage validation
        let dsn = self.storage.dsn.as_str();
        if dsn != MEMORY_DSN && !dsn.starts_with("postgres://") && !dsn.starts_with("postgresql://") {
            return Err("storage.dsn must be \"memory\" or a postgres:// URL".into());
        }
        if !self.storage.is_memory() && self.storage.pool_size == 0 {
            return Err("storage.pool_size must be > 0".into());
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
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
    /// Require a bearer token on every warden and management endpoint.
    #[serde(default)]
    pub guard_admin_endpoints: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    4444
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
            guard_admin_endpoints: false,
        }
    }
}

/// Storage backend selection.
///
/// `dsn = "memory"` keeps everything in process; a `postgres://` URL selects
/// the PostgreSQL backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_dsn")]
    pub dsn: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_dsn() -> String {
    MEMORY_DSN.into()
}
fn default_pool_size() -> u32 {
    10
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_run_migrations() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            pool_size: default_pool_size(),
            connect_timeout: default_connect_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl StorageConfig {
    pub fn is_memory(&self) -> bool {
        self.dsn == MEMORY_DSN
    }

    /// PostgreSQL settings, or `None` for the in-memory backend.
    pub fn postgres(&self) -> Option<PostgresConfig> {
        if self.is_memory() {
            return None;
        }
        Some(
            PostgresConfig::new(self.dsn.clone())
                .with_max_connections(self.pool_size)
                .with_acquire_timeout(self.connect_timeout)
                .with_migrations(self.run_migrations),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::{Path, PathBuf};

    /// Default configuration file, read when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "warden.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        }
        // Environment variable overrides, e.g., WARDEN__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("WARDEN")
                .prefix_separator("__")
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

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
