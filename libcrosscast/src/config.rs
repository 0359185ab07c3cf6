//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub twitter: Option<OAuthAppConfig>,
    pub instagram: Option<OAuthAppConfig>,
    /// One Google OAuth app covers both YouTube and Calendar
    pub google: Option<OAuthAppConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret for the dispatch trigger; unset means unauthenticated
    pub dispatch_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            dispatch_secret: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

/// Registered OAuth application credentials for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAppConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;

        // The trigger secret is deployment-specific, so the env var wins
        if let Ok(secret) = std::env::var("CROSSCAST_DISPATCH_SECRET") {
            config.server.dispatch_secret = Some(secret);
        }

        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            server: ServerConfig::default(),
            twitter: None,
            instagram: None,
            google: None,
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("crosscast"))
}
