use super::types::Config;
use std::path::{Path, PathBuf};

/// Startup misconfiguration; the only fatal error class
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Default location: `<config_dir>/iptv-relay/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
        Ok(dir.join("iptv-relay").join("config.toml"))
    }

    /// Load configuration; a missing file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write a default config file unless one already exists
    pub fn init(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if path.exists() {
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = Config::default().to_toml()?;
        std::fs::write(&path, content).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn print(&self) -> Result<(), ConfigError> {
        println!("{}", self.to_toml()?);
        Ok(())
    }

    /// Validate values that would make the relay misbehave at runtime
    pub fn check(&self) -> Result<(), ConfigError> {
        let playlist_url = url::Url::parse(&self.playlist.url)
            .map_err(|e| ConfigError::Invalid(format!("playlist.url: {}", e)))?;
        if !matches!(playlist_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "playlist.url must be http(s), got {}",
                playlist_url.scheme()
            )));
        }

        if self.vpn.proxy_host.trim().is_empty() {
            return Err(ConfigError::Invalid("vpn.proxy_host is empty".to_string()));
        }
        if self.vpn.proxy_port == 0 {
            return Err(ConfigError::Invalid("vpn.proxy_port must be non-zero".to_string()));
        }
        if self.vpn.geo_providers.is_empty() {
            return Err(ConfigError::Invalid(
                "vpn.geo_providers needs at least one provider".to_string(),
            ));
        }

        if self.health.batch_size == 0 {
            return Err(ConfigError::Invalid("health.batch_size must be >= 1".to_string()));
        }
        if self.health.run_interval_secs == 0
            || self.playlist.refresh_interval_secs == 0
            || self.vpn.check_interval_secs == 0
        {
            return Err(ConfigError::Invalid("timer intervals must be non-zero".to_string()));
        }
        if self.health.retention_window() < self.health.freshness_window() {
            return Err(ConfigError::Invalid(
                "health.retention_days must cover health.freshness_window_hours".to_string(),
            ));
        }
        if self.stream.chunk_size == 0 {
            return Err(ConfigError::Invalid("stream.chunk_size must be non-zero".to_string()));
        }

        Ok(())
    }
}
