//! Configuration management for riderecorder.
//!
//! Configuration is loaded with figment from TOML config files,
//! environment variables, and defaults. Debounce timings, sampling
//! cadences and the fix-acquisition timeout are deliberately plain
//! constants here rather than guessed elsewhere.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "riderecorder";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `RIDERECORDER_`)
/// 2. TOML config file at `~/.config/riderecorder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// GPS receiver configuration.
    pub gps: GpsConfig,
    /// Environment sensor configuration.
    pub environment: EnvironmentConfig,
    /// Joystick configuration.
    pub input: InputConfig,
    /// LED matrix configuration.
    pub led: LedConfig,
    /// Recorder state machine configuration.
    pub recorder: RecorderConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one container file per session.
    /// Defaults to `~/.local/share/riderecorder`.
    pub data_dir: Option<PathBuf>,
    /// Bound on the store worker's command queue; overflowing it is a
    /// fault, not a buffer.
    pub queue_depth: usize,
}

/// GPS receiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Host of the gpsd instance serving the receiver.
    pub gpsd_host: String,
    /// Port of the gpsd instance.
    pub gpsd_port: u16,
    /// Sampling cadence in milliseconds.
    pub cadence_ms: u64,
    /// Bound on a single sensor read, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Consecutive failures before the port is reported degraded.
    pub degraded_after: u32,
}

/// Environment sensor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Industrial-IO sysfs root to scan for the sensor package.
    /// Defaults to `/sys/bus/iio/devices`.
    pub iio_dir: Option<PathBuf>,
    /// Sampling cadence in milliseconds.
    pub cadence_ms: u64,
    /// Bound on a single sensor read, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Consecutive failures before the port is reported degraded.
    pub degraded_after: u32,
}

/// Joystick configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Event device path. When unset the device is discovered by name.
    pub device: Option<PathBuf>,
    /// Minimum spacing between accepted events, in milliseconds.
    pub debounce_ms: u64,
    /// Press duration that turns a press into a long press, in milliseconds.
    pub long_press_ms: u64,
}

/// LED matrix configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// Framebuffer device path. When unset the device is discovered by name.
    pub framebuffer: Option<PathBuf>,
}

/// Recorder state machine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// How long the Armed state waits for a first usable fix, in seconds.
    pub fix_timeout_secs: u64,
    /// Label attached to waypoints marked with a long press.
    pub waypoint_label: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None, // Will be resolved to default at runtime
            queue_depth: 64,
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            gpsd_host: "127.0.0.1".to_string(),
            gpsd_port: 2947,
            cadence_ms: 1000,
            poll_timeout_ms: 800,
            degraded_after: 5,
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            iio_dir: None, // Will be resolved to default at runtime
            cadence_ms: 1000,
            poll_timeout_ms: 800,
            degraded_after: 5,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: None,
            debounce_ms: 150,
            long_press_ms: 900,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            fix_timeout_secs: 120,
            waypoint_label: "marked".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `RIDERECORDER_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("RIDERECORDER_").split("_"));

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
        if self.storage.queue_depth == 0 {
            return Err(Error::ConfigValidation {
                message: "storage queue_depth must be greater than 0".to_string(),
            });
        }

        for (name, cadence, timeout) in [
            ("gps", self.gps.cadence_ms, self.gps.poll_timeout_ms),
            (
                "environment",
                self.environment.cadence_ms,
                self.environment.poll_timeout_ms,
            ),
        ] {
            if cadence == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} cadence_ms must be greater than 0"),
                });
            }
            if timeout == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} poll_timeout_ms must be greater than 0"),
                });
            }
        }

        if self.input.debounce_ms >= self.input.long_press_ms {
            return Err(Error::ConfigValidation {
                message: format!(
                    "debounce_ms ({}) must be shorter than long_press_ms ({})",
                    self.input.debounce_ms, self.input.long_press_ms
                ),
            });
        }

        if self.recorder.fix_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "fix_timeout_secs must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the data directory, resolving defaults if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the GPS sampling cadence as a Duration.
    #[must_use]
    pub fn gps_cadence(&self) -> Duration {
        Duration::from_millis(self.gps.cadence_ms)
    }

    /// Get the GPS poll timeout as a Duration.
    #[must_use]
    pub fn gps_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.gps.poll_timeout_ms)
    }

    /// Get the environment sampling cadence as a Duration.
    #[must_use]
    pub fn environment_cadence(&self) -> Duration {
        Duration::from_millis(self.environment.cadence_ms)
    }

    /// Get the environment poll timeout as a Duration.
    #[must_use]
    pub fn environment_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.environment.poll_timeout_ms)
    }

    /// Get the debounce gap as a Duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.input.debounce_ms)
    }

    /// Get the long-press threshold as a Duration.
    #[must_use]
    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.input.long_press_ms)
    }

    /// Get the Armed fix-acquisition timeout as a Duration.
    #[must_use]
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.recorder.fix_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.gps.gpsd_host, "127.0.0.1");
        assert_eq!(config.gps.gpsd_port, 2947);
        assert_eq!(config.gps.cadence_ms, 1000);
        assert_eq!(config.environment.cadence_ms, 1000);
        assert_eq!(config.storage.queue_depth, 64);
    }

    #[test]
    fn test_default_input_config() {
        let input = InputConfig::default();

        assert!(input.device.is_none());
        assert_eq!(input.debounce_ms, 150);
        assert_eq!(input.long_press_ms, 900);
    }

    #[test]
    fn test_default_recorder_config() {
        let recorder = RecorderConfig::default();

        assert_eq!(recorder.fix_timeout_secs, 120);
        assert_eq!(recorder.waypoint_label, "marked");
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_queue_depth() {
        let mut config = Config::default();
        config.storage.queue_depth = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("queue_depth"));
    }

    #[test]
    fn test_validate_zero_cadence() {
        let mut config = Config::default();
        config.gps.cadence_ms = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cadence_ms"));
    }

    #[test]
    fn test_validate_zero_environment_timeout() {
        let mut config = Config::default();
        config.environment.poll_timeout_ms = 0;

        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("environment"));
        assert!(err.contains("poll_timeout_ms"));
    }

    #[test]
    fn test_validate_debounce_exceeding_long_press() {
        let mut config = Config::default();
        config.input.debounce_ms = 1000;
        config.input.long_press_ms = 900;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_validate_zero_fix_timeout() {
        let mut config = Config::default();
        config.recorder.fix_timeout_secs = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_data_dir_default() {
        let config = Config::default();
        let path = config.data_dir();
        assert!(path.to_string_lossy().contains("riderecorder"));
    }

    #[test]
    fn test_data_dir_custom() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/custom/rides"));
        assert_eq!(config.data_dir(), PathBuf::from("/custom/rides"));
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config::default();

        assert_eq!(config.gps_cadence(), Duration::from_millis(1000));
        assert_eq!(config.gps_poll_timeout(), Duration::from_millis(800));
        assert_eq!(config.environment_cadence(), Duration::from_millis(1000));
        assert_eq!(config.debounce(), Duration::from_millis(150));
        assert_eq!(config.long_press(), Duration::from_millis(900));
        assert_eq!(config.fix_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("riderecorder"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_serialize() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("gpsd_host"));
        assert!(json.contains("queue_depth"));
        assert!(json.contains("waypoint_label"));
    }

    #[test]
    fn test_gps_config_deserialize() {
        let json = r#"{"gpsd_host": "10.0.0.7", "cadence_ms": 500}"#;
        let gps: GpsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(gps.gpsd_host, "10.0.0.7");
        assert_eq!(gps.cadence_ms, 500);
        // Unspecified fields come from defaults
        assert_eq!(gps.gpsd_port, 2947);
    }

    #[test]
    fn test_config_clone() {
        let config = Config::default();
        let cloned = config.clone();
        assert_eq!(config, cloned);
    }
}
