use activity_sync_core::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Login state persisted by `act login`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    pub email: Option<String>,
    /// Bearer token returned by the login endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AuthConfig {
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Base URL of the activities API
    pub api_url: ConfigValue<String>,
    /// Per-request timeout; none means wait indefinitely
    pub timeout_secs: ConfigValue<Option<u64>>,
    /// Report the saved record after create/update
    pub navigate_on_persist: ConfigValue<bool>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub auth: AuthConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    navigate_on_persist: Option<bool>,
    auth: Option<AuthConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut api_url = ConfigValue::new(DEFAULT_API_URL.to_string(), ConfigSource::Default);
        let mut timeout_secs = ConfigValue::new(None, ConfigSource::Default);
        let mut navigate_on_persist = ConfigValue::new(true, ConfigSource::Default);
        let mut config_file = None;
        let mut auth = AuthConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.api_url {
                api_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(secs) = file_config.timeout_secs {
                timeout_secs = ConfigValue::new(Some(secs), ConfigSource::File);
            }
            if let Some(navigate) = file_config.navigate_on_persist {
                navigate_on_persist = ConfigValue::new(navigate, ConfigSource::File);
            }
            if let Some(auth_config) = file_config.auth {
                auth = auth_config;
            }
        }

        if let Ok(url) = std::env::var("ACT_API_URL") {
            api_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(secs) = std::env::var("ACT_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("ACT_TIMEOUT_SECS", secs.clone()))?;
            timeout_secs = ConfigValue::new(Some(secs), ConfigSource::Environment);
        }
        if let Ok(token) = std::env::var("ACT_TOKEN") {
            auth.token = Some(token);
        }

        Ok(Self {
            api_url,
            timeout_secs,
            navigate_on_persist,
            config_file,
            auth,
        })
    }

    /// Store behaviour derived from this configuration.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            navigate_on_persist: self.navigate_on_persist.value,
            remote_timeout: self.timeout_secs.value.map(Duration::from_secs),
            ..StoreConfig::default()
        }
    }

    /// File that login/logout write to.
    pub fn writable_path(&self) -> PathBuf {
        self.config_file
            .clone()
            .unwrap_or_else(Self::default_config_path)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/act/
    /// - macOS: ~/Library/Application Support/act/
    /// - Windows: %APPDATA%/act/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("act")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    ReadError(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    ParseError(PathBuf, serde_yaml::Error),

    #[error("Invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}
