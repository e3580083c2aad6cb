//! Runtime configuration consumed by the ingestion pipeline.
//!
//! How the values are gathered (JSON file, CLI flags, environment) is up to
//! the caller; this module only defines the shape, the defaults and the
//! validation rules.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub energy: EnergyConfig,
    pub weather: WeatherConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing sections fall back to
    /// their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.energy.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("energy API key is empty".into()));
        }
        if self.energy.zone.trim().is_empty() {
            return Err(ConfigError::Invalid("energy zone is empty".into()));
        }
        if self.store.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store base URL is empty".into()));
        }
        if self.store.database.trim().is_empty() {
            return Err(ConfigError::Invalid("store database is empty".into()));
        }
        if !(-90.0..=90.0).contains(&self.weather.latitude) {
            return Err(ConfigError::Invalid(format!(
                "latitude {} out of range",
                self.weather.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.weather.longitude) {
            return Err(ConfigError::Invalid(format!(
                "longitude {} out of range",
                self.weather.longitude
            )));
        }
        let http = &self.http;
        if http.connect_timeout_secs == 0
            || http.read_timeout_secs == 0
            || http.write_timeout_secs == 0
        {
            return Err(ConfigError::Invalid("HTTP timeouts must be > 0".into()));
        }
        Ok(())
    }
}

/// Grid power source (Electricity Maps).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub base_url: String,
    /// Geographic zone identifier, e.g. `"GB"`.
    pub zone: String,
    pub api_key: String,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.electricitymap.org".to_string(),
            zone: "GB".to_string(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for EnergyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnergyConfig")
            .field("base_url", &self.base_url)
            .field("zone", &self.zone)
            .field("api_key", &redacted(&self.api_key))
            .finish()
    }
}

/// Local weather source (Open-Meteo). Defaults to York.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com".to_string(),
            latitude: 53.9324727,
            longitude: -1.1204176,
        }
    }
}

/// CouchDB document store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Server URL. A bare `host:port` is treated as plain HTTP.
    pub base_url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5984".to_string(),
            database: "wattsync".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl StoreConfig {
    /// URL of the database itself, without credentials.
    pub fn database_url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let database = self.database.trim().trim_matches('/');
        if base.contains("://") {
            format!("{base}/{database}")
        } else {
            format!("http://{base}/{database}")
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

/// Transport timeouts, fixed once when the HTTP agent is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 15,
            write_timeout_secs: 15,
            user_agent: format!("wattsync/{}", crate::VERSION),
        }
    }
}

/// Trigger endpoint listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}
