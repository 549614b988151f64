//! Configuration management for locshare.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::DEFAULT_HISTORY_CAPACITY;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "locshare";

/// Environment variable prefix.
const ENV_PREFIX: &str = "LOCSHARE_";

/// Largest base64 payload inlined into a downloaded page.
pub const DEFAULT_INLINE_LIMIT: usize = 2_000_000;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `LOCSHARE_`, sections split on `__`)
/// 2. TOML config file at `~/.config/locshare/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerConfig,
    /// Public origins embedded in responses.
    pub urls: UrlConfig,
    /// Shared page configuration.
    pub artifact: ArtifactConfig,
    /// Location history configuration.
    pub history: HistoryConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,
    /// Port to bind.
    pub port: u16,
}

/// Public origins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    /// Origin of the viewer front end; shareable links and image URLs hang off it.
    pub viewer_url: String,
    /// Public origin of this API. When unset, it is derived from each request.
    pub backend_url: Option<String>,
}

/// Shared page configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory served under `/images`.
    pub asset_dir: PathBuf,
    /// Header image file inside `asset_dir`.
    pub asset_file: String,
    /// MIME type of the header image.
    pub asset_mime: String,
    /// Maximum base64 length inlined into downloaded pages.
    pub inline_limit: usize,
}

/// Location history configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples kept per link before the oldest is evicted.
    pub capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            viewer_url: "http://localhost:3000".to_string(),
            backend_url: None,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            asset_file: "share.webp".to_string(),
            asset_mime: "image/webp".to_string(),
            inline_limit: DEFAULT_INLINE_LIMIT,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty())
}

impl Config {
    /// Load configuration from all sources.
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
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Config = figment.extract()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Strip trailing slashes so URLs can be joined with `/path`.
    pub fn normalize(&mut self) {
        let trimmed = self.urls.viewer_url.trim_end_matches('/').to_string();
        self.urls.viewer_url = trimmed;
        if let Some(backend) = self.urls.backend_url.take() {
            let backend = backend.trim_end_matches('/').to_string();
            self.urls.backend_url = (!backend.is_empty()).then_some(backend);
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if !is_http_url(&self.urls.viewer_url) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "urls.viewer_url must be an http(s) URL, got '{}'",
                    self.urls.viewer_url
                ),
            });
        }

        if let Some(backend) = &self.urls.backend_url {
            if !is_http_url(backend) {
                return Err(Error::ConfigValidation {
                    message: format!("urls.backend_url must be an http(s) URL, got '{backend}'"),
                });
            }
        }

        if self.history.capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "history.capacity must be greater than 0".to_string(),
            });
        }

        if self.artifact.inline_limit == 0 {
            return Err(Error::ConfigValidation {
                message: "artifact.inline_limit must be greater than 0".to_string(),
            });
        }

        if self.artifact.asset_file.is_empty() {
            return Err(Error::ConfigValidation {
                message: "artifact.asset_file must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_address` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .server
            .bind_address
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid bind address '{}'", self.server.bind_address),
            })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Path of the header image on disk.
    #[must_use]
    pub fn asset_path(&self) -> PathBuf {
        self.artifact.asset_dir.join(&self.artifact.asset_file)
    }

    /// Public URL of the header image.
    #[must_use]
    pub fn image_url(&self) -> String {
        format!("{}/images/{}", self.urls.viewer_url, self.artifact.asset_file)
    }
}
