pub mod cycle;
pub mod serve;

use std::path::PathBuf;

use clap::Args;

use wattsync_core::{Config, ConfigError, Logger};

/// Configuration shared by every subcommand. Flags and their environment
/// variables override values from `--config`.
#[derive(Args, Default)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long, global = true, env = "WATTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Electricity Maps API key
    #[arg(long, global = true, env = "ELECTRICITY_MAPS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Electricity Maps zone identifier (e.g. GB)
    #[arg(long, global = true, env = "WATTSYNC_ZONE")]
    pub zone: Option<String>,

    /// Weather latitude
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Weather longitude
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// CouchDB base URL
    #[arg(long, global = true, env = "COUCHDB_URL")]
    pub couchdb_url: Option<String>,

    /// CouchDB database name
    #[arg(long, global = true, env = "COUCHDB_DB")]
    pub couchdb_db: Option<String>,

    /// CouchDB user
    #[arg(long, global = true, env = "COUCHDB_USER")]
    pub couchdb_user: Option<String>,

    /// CouchDB password
    #[arg(long, global = true, env = "COUCHDB_PASSWORD", hide_env_values = true)]
    pub couchdb_password: Option<String>,
}

impl ConfigArgs {
    /// Load the file (or defaults), apply overrides, validate.
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(key) = &self.api_key {
            config.energy.api_key = key.clone();
        }
        if let Some(zone) = &self.zone {
            config.energy.zone = zone.clone();
        }
        if let Some(latitude) = self.latitude {
            config.weather.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            config.weather.longitude = longitude;
        }
        if let Some(url) = &self.couchdb_url {
            config.store.base_url = url.clone();
        }
        if let Some(db) = &self.couchdb_db {
            config.store.database = db.clone();
        }
        if let Some(user) = &self.couchdb_user {
            config.store.username = user.clone();
        }
        if let Some(password) = &self.couchdb_password {
            config.store.password = password.clone();
        }
    }
}

/// Root logger for the process.
pub fn root_logger() -> Logger {
    Logger::new(wattsync_core::logging::DEFAULT_TARGET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = ConfigArgs {
            api_key: Some("k".into()),
            zone: Some("FR".into()),
            latitude: Some(48.85),
            couchdb_db: Some("grid".into()),
            ..ConfigArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.energy.api_key, "k");
        assert_eq!(config.energy.zone, "FR");
        assert_eq!(config.weather.latitude, 48.85);
        assert_eq!(config.store.database, "grid");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_missing_api_key_is_invalid() {
        let args = ConfigArgs::default();
        assert!(matches!(args.resolve(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_out_of_range_latitude_is_invalid() {
        let args = ConfigArgs {
            api_key: Some("k".into()),
            latitude: Some(123.0),
            ..ConfigArgs::default()
        };
        assert!(args.resolve().is_err());
    }
}
