#![deny(unsafe_code)]

//! Configuration for the wifi-ap control daemon.
//!
//! Two kinds of configuration live here:
//!
//! - the access-point configuration itself: `KEY=VALUE` shell-variable
//!   files merged from several layers ([`store`]), encoded by [`codec`], and
//!   guarded on write by a key [`whitelist`];
//! - the daemon's own settings ([`AppConfig`]): where those layers live,
//!   which program to supervise, and how to log. Settings come from an
//!   optional TOML file with defaults taken from the `SNAP`, `SNAP_DATA`,
//!   and `SNAP_USER_DATA` environment variables.

/// `KEY=VALUE` line encoding, shell escaping, and key spelling conversion.
pub mod codec;
/// Layered configuration files and the serialized data-layer writer.
pub mod store;
/// Write-request key whitelist.
pub mod whitelist;
/// Configuration value types.
pub mod value;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use store::{ConfigLayers, ConfigStore, DataLayerGuard};
pub use value::{ConfigMap, ConfigValue};
pub use whitelist::ValidationError;
pub use whitelist::Whitelist;

/// Environment variable naming the read-only install directory.
pub const ENV_INSTALL_DIR: &str = "SNAP";
/// Environment variable naming the writable data directory.
pub const ENV_DATA_DIR: &str = "SNAP_DATA";
/// Environment variable naming the writable per-user data directory.
pub const ENV_USER_DATA_DIR: &str = "SNAP_USER_DATA";

/// Socket location relative to the data directory.
pub const SOCKET_PATH_SUFFIX: &str = "sockets/control";

/// Errors from reading, writing, or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write configuration file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level daemon settings.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Filesystem roots of the configuration layers.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Daemon runtime settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Roots of the read-only and writable configuration trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Read-only install directory holding `conf/default-config` and `bin/ap.sh`.
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Writable data directory holding the primary `config` and the socket.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Writable per-user data directory holding the user `config` overlay.
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            data_dir: default_data_dir(),
            user_data_dir: default_user_data_dir(),
        }
    }
}

fn env_or_empty(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn default_install_dir() -> String {
    env_or_empty(ENV_INSTALL_DIR)
}

fn default_data_dir() -> String {
    env_or_empty(ENV_DATA_DIR)
}

fn default_user_data_dir() -> String {
    env_or_empty(ENV_USER_DATA_DIR)
}

/// Daemon runtime settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Override for the control socket path (default `<data_dir>/sockets/control`).
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Override for the access-point program (default `<install_dir>/bin/ap.sh`).
    #[serde(default)]
    pub ap_program: Option<String>,

    /// Extra arguments passed to the access-point program.
    #[serde(default)]
    pub ap_args: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Settings derived purely from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.data_dir.is_empty() {
            return Err(ConfigError::Validation(format!(
                "paths.data_dir must not be empty (is {ENV_DATA_DIR} set?)"
            )));
        }
        if self.daemon.socket_path.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty".to_string(),
            ));
        }
        if self.daemon.ap_program.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "daemon.ap_program must not be empty".to_string(),
            ));
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }
        Ok(())
    }

    /// The configuration layers described by these settings.
    pub fn layers(&self) -> ConfigLayers {
        ConfigLayers::from_roots(
            Path::new(&self.paths.install_dir),
            Path::new(&self.paths.data_dir),
            Path::new(&self.paths.user_data_dir),
        )
    }

    /// Where the daemon listens and the CLI connects.
    pub fn socket_path(&self) -> PathBuf {
        self.daemon
            .socket_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(&self.paths.data_dir).join(SOCKET_PATH_SUFFIX))
    }

    /// The access-point program the daemon supervises.
    pub fn ap_program(&self) -> PathBuf {
        self.daemon
            .ap_program
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(&self.paths.install_dir).join("bin").join("ap.sh"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const FULL_TOML: &str = r#"
        [paths]
        install_dir = "/snap/wifi-ap/current"
        data_dir = "/var/snap/wifi-ap/current"
        user_data_dir = "/root/snap/wifi-ap/current"

        [daemon]
        ap_args = ["--foreground"]

        [logging]
        level = "debug"
    "#;

    #[test]
    fn test_default_logging() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.daemon.socket_path.is_none());
        assert!(config.daemon.ap_args.is_empty());
    }

    #[test]
    fn test_parse_full_toml() {
        let config = AppConfig::parse(FULL_TOML).unwrap();
        assert_eq!(config.paths.data_dir, "/var/snap/wifi-ap/current");
        assert_eq!(config.daemon.ap_args, vec!["--foreground".to_string()]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_derived_paths() {
        let config = AppConfig::parse(FULL_TOML).unwrap();
        assert_eq!(
            config.socket_path(),
            PathBuf::from("/var/snap/wifi-ap/current/sockets/control")
        );
        assert_eq!(
            config.ap_program(),
            PathBuf::from("/snap/wifi-ap/current/bin/ap.sh")
        );
        assert_eq!(
            config.layers().default_layer(),
            Path::new("/snap/wifi-ap/current/conf/default-config")
        );
        assert_eq!(
            config.layers().user_layer(),
            Path::new("/root/snap/wifi-ap/current/config")
        );
    }

    #[test]
    fn test_overrides_win_over_derived_paths() {
        let toml = r#"
            [paths]
            data_dir = "/data"

            [daemon]
            socket_path = "/run/wifi-ap.sock"
            ap_program = "/usr/bin/hostapd-wrapper"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.socket_path(), PathBuf::from("/run/wifi-ap.sock"));
        assert_eq!(config.ap_program(), PathBuf::from("/usr/bin/hostapd-wrapper"));
    }

    #[test]
    fn test_validation_rejects_empty_data_dir() {
        let toml = r#"
            [paths]
            data_dir = ""
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [paths]
            data_dir = "/data"

            [logging]
            level = "loud"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_overrides() {
        let toml = r#"
            [paths]
            data_dir = "/data"

            [daemon]
            socket_path = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wifi-ap.toml");
        tokio::fs::write(&path, FULL_TOML).await.unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.paths.install_dir, "/snap/wifi-ap/current");
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/wifi-ap.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
