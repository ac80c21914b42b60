//! Configuration management for wormvol
//!
//! Handles loading and validation of `wormvol.toml`. Every setting has a
//! default matching a stock Bacula install, so an absent file is valid.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::value::NumericLocale;
use crate::volume::CatalogTimeZone;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "WORMVOL_CONFIG";

/// Config file read when neither a path nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bacula/wormvol.toml";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Device and catalog interpretation settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Console subprocess settings
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Directory holding volume files; volume names are appended verbatim
    #[serde(default = "default_device_root")]
    pub device_root: String,

    /// Time zone of catalog timestamps
    #[serde(default)]
    pub timezone: CatalogTimeZone,

    /// Numeric locale of the console output (en_US, de_DE, fr_FR, C, POSIX)
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device_root: default_device_root(),
            timezone: CatalogTimeZone::default(),
            locale: default_locale(),
        }
    }
}

fn default_device_root() -> String {
    "/srv/bacula/worm0/".to_string()
}

fn default_locale() -> String {
    "en_US".to_string()
}

/// Console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Console executable
    #[serde(default = "default_console_command")]
    pub command: String,

    /// Arguments passed before the command is written to stdin
    #[serde(default = "default_console_args")]
    pub args: Vec<String>,

    /// Seconds to wait for one command before killing the console
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            command: default_console_command(),
            args: default_console_args(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_console_command() -> String {
    "/usr/sbin/bconsole".to_string()
}

fn default_console_args() -> Vec<String> {
    vec!["-n".to_string()]
}

fn default_timeout_seconds() -> u64 {
    300
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Otherwise `$WORMVOL_CONFIG` is used if
    /// set, then [`DEFAULT_CONFIG_PATH`] if present, then built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load_from(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from(default_path);
        }
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: PathBuf::from(path),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check settings that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.general.device_root;
        if root.is_empty() {
            return Err(ConfigError::Invalid("general.device_root is empty".to_string()));
        }
        if !root.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "general.device_root must end with '/': {root}"
            )));
        }
        if self.console.command.trim().is_empty() {
            return Err(ConfigError::Invalid("console.command is empty".to_string()));
        }
        if self.console.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "console.timeout_seconds must be positive".to_string(),
            ));
        }
        self.numeric_locale()?;
        Ok(())
    }

    /// Numeric locale named by `general.locale`
    pub fn numeric_locale(&self) -> Result<NumericLocale, ConfigError> {
        NumericLocale::from_name(&self.general.locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.general.device_root, "/srv/bacula/worm0/");
        assert_eq!(config.general.timezone, CatalogTimeZone::Local);
        assert_eq!(config.console.command, "/usr/sbin/bconsole");
        assert_eq!(config.console.args, vec!["-n"]);
        assert_eq!(config.console.timeout_seconds, 300);
        assert_eq!(config.numeric_locale().unwrap(), NumericLocale::EN_US);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.general.locale, "en_US");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = Config::from_toml(
            r#"
[general]
timezone = "utc"
locale = "de_DE"

[console]
timeout_seconds = 30

[logging]
format = "json"
file = "/var/spool/bacula/wormstatus.log"
"#,
        )
        .unwrap();
        assert_eq!(config.general.timezone, CatalogTimeZone::Utc);
        assert_eq!(config.general.device_root, "/srv/bacula/worm0/");
        assert_eq!(config.numeric_locale().unwrap(), NumericLocale::DE_DE);
        assert_eq!(config.console.timeout_seconds, 30);
        assert_eq!(config.console.command, "/usr/sbin/bconsole");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("/var/spool/bacula/wormstatus.log"))
        );
    }

    #[test]
    fn device_root_needs_trailing_separator() {
        let err = Config::from_toml("[general]\ndevice_root = \"/srv/bacula/worm0\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("device_root")));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(matches!(
            Config::from_toml("[console]\ntimeout_seconds = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_locale_is_rejected() {
        assert!(matches!(
            Config::from_toml("[general]\nlocale = \"xx_XX\"\n"),
            Err(ConfigError::UnknownLocale(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_toml("[general]\ndevice = \"/tmp/\"\n"),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\ndevice_root = \"/mnt/worm/\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.general.device_root, "/mnt/worm/");
    }

    #[test]
    fn load_from_missing_file_fails() {
        let err = Config::load_from(Path::new("/nonexistent/wormvol.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }

    #[test]
    fn toml_output_parses_back() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("device_root"));
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.general.device_root, config.general.device_root);
        assert_eq!(parsed.console.args, config.console.args);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
