//! Configuration management for musterpoint.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::person::UNASSIGNED_ZONE;
use crate::session::SessionSettings;
use crate::zone::{ZoneConfig, ZoneRegistry};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "musterpoint";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "muster.db";

/// Environment variable prefix.
const ENV_PREFIX: &str = "MUSTERPOINT_";

/// Zone ids end up in CLI arguments and storage keys.
const ZONE_ID_PATTERN: &str = r"^[a-z0-9][a-z0-9_-]*$";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `MUSTERPOINT_`, `__` between sections)
/// 2. TOML config file at `~/.config/musterpoint/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Site layout.
    pub site: SiteConfig,
    /// Session timers.
    pub clock: ClockConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/musterpoint/muster.db`
    pub database_path: Option<PathBuf>,
}

/// The site being mustered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Display name of the site.
    pub name: String,
    /// Zone assigned to imported people with no recorded zone.
    pub default_zone: String,
    /// Zone catalogue, in display order.
    pub zones: Vec<ZoneConfig>,
}

/// Session timer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Seconds between aggregate refreshes while a session is active.
    pub refresh_interval_secs: u64,
    /// Length of the drill countdown in seconds.
    pub drill_countdown_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Main Site".to_string(),
            default_zone: "office".to_string(),
            zones: default_zones(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            drill_countdown_secs: 10,
        }
    }
}

/// Zone catalogue used when none is configured.
fn default_zones() -> Vec<ZoneConfig> {
    vec![
        ZoneConfig::new("production", "Production Floor", "Assembly Point A", 150),
        ZoneConfig::new("warehouse", "Warehouse", "Assembly Point B", 60),
        ZoneConfig::new("office", "Office Block", "Assembly Point C", 80),
        ZoneConfig::new("yard", "Loading Yard", "Assembly Point D", 40),
    ]
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.clock.refresh_interval_secs == 0 {
            return Err(Error::config("refresh_interval_secs must be greater than 0"));
        }

        if self.clock.drill_countdown_secs == 0 {
            return Err(Error::config("drill_countdown_secs must be greater than 0"));
        }

        let zone_id = Regex::new(ZONE_ID_PATTERN)
            .map_err(|e| Error::config(format!("invalid zone id pattern: {e}")))?;
        for zone in &self.site.zones {
            if !zone_id.is_match(&zone.id) {
                return Err(Error::config(format!(
                    "invalid zone id '{}': use lowercase letters, digits, '-' or '_'",
                    zone.id
                )));
            }
        }

        let zones = self.zone_registry()?;

        let default_zone = &self.site.default_zone;
        if default_zone != UNASSIGNED_ZONE && !zones.contains(default_zone) {
            return Err(Error::config(format!(
                "default_zone '{default_zone}' is not a configured zone"
            )));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Build the zone catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if a zone id is empty or repeated, or a capacity is zero.
    pub fn zone_registry(&self) -> Result<ZoneRegistry> {
        ZoneRegistry::new(self.site.zones.clone())
    }

    /// Get the refresh interval as a Duration.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.clock.refresh_interval_secs)
    }

    /// Get the drill countdown as a Duration.
    #[must_use]
    pub fn drill_countdown(&self) -> Duration {
        Duration::from_secs(self.clock.drill_countdown_secs)
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            refresh_interval: self.refresh_interval(),
            drill_countdown: self.drill_countdown(),
            default_zone: self.site.default_zone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(tag: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "musterpoint_config_{tag}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.site.default_zone, "office");
        assert_eq!(config.site.zones.len(), 4);
        assert_eq!(config.clock.refresh_interval_secs, 30);
        assert_eq!(config.clock.drill_countdown_secs, 10);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_refresh_interval() {
        let mut config = Config::default();
        config.clock.refresh_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("refresh_interval_secs"));
    }

    #[test]
    fn test_validate_zero_drill_countdown() {
        let mut config = Config::default();
        config.clock.drill_countdown_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("drill_countdown_secs"));
    }

    #[test]
    fn test_validate_bad_zone_id() {
        let mut config = Config::default();
        config.site.zones[0].id = "Production Floor".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid zone id"));
    }

    #[test]
    fn test_validate_duplicate_zone() {
        let mut config = Config::default();
        config.site.zones[1].id = "production".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_default_zone() {
        let mut config = Config::default();
        config.site.default_zone = "canteen".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("canteen"));
    }

    #[test]
    fn test_unassigned_default_zone_is_allowed() {
        let mut config = Config::default();
        config.site.default_zone = UNASSIGNED_ZONE.to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("musterpoint"));
        assert!(path.to_string_lossy().ends_with("muster.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/muster.db"));

        assert_eq!(config.database_path(), PathBuf::from("/custom/path/muster.db"));
    }

    #[test]
    fn test_session_settings() {
        let mut config = Config::default();
        config.clock.refresh_interval_secs = 5;
        config.site.default_zone = "yard".to_string();

        let settings = config.session_settings();
        assert_eq!(settings.refresh_interval, Duration::from_secs(5));
        assert_eq!(settings.drill_countdown, Duration::from_secs(10));
        assert_eq!(settings.default_zone, "yard");
    }

    #[test]
    fn test_zone_registry_order() {
        let registry = Config::default().zone_registry().unwrap();
        let ids: Vec<&str> = registry.configs().iter().map(|z| z.id.as_str()).collect();
        assert_eq!(ids, vec!["production", "warehouse", "office", "yard"]);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("musterpoint"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_toml_replaces_zone_list() {
        let path = write_config(
            "zones",
            r#"
[site]
name = "Riverside Plant"
default_zone = "lab"

[[site.zones]]
id = "lab"
name = "Laboratory"
muster_point = "North Gate"
capacity = 25

[clock]
refresh_interval_secs = 15
"#,
        );

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.site.name, "Riverside Plant");
        assert_eq!(config.site.zones.len(), 1);
        assert_eq!(config.site.zones[0].muster_point, "North Gate");
        assert_eq!(config.clock.refresh_interval_secs, 15);
        assert_eq!(config.clock.drill_countdown_secs, 10);
    }

    #[test]
    fn test_load_invalid_toml_fails_validation() {
        let path = write_config(
            "invalid",
            r#"
[site]
default_zone = "nowhere"
"#,
        );

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_toml_storage_and_clock_sections() {
        let path = write_config(
            "sections",
            r#"
[storage]
database_path = "/srv/muster/site.db"

[clock]
drill_countdown_secs = 45
"#,
        );

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/srv/muster/site.db"));
        assert_eq!(config.clock.drill_countdown_secs, 45);
        assert_eq!(config.clock.refresh_interval_secs, 30);
        assert_eq!(config.site.zones.len(), 4);
    }

    #[test]
    fn test_load_toml_zero_countdown_is_rejected() {
        let path = write_config(
            "zero_countdown",
            r#"
[clock]
drill_countdown_secs = 0
"#,
        );

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("refresh_interval_secs"));
        assert!(json.contains("muster_point"));
    }
}
