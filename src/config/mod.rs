use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::credentials::DEFAULT_CREDENTIALS_KEY;
use crate::pipeline::join_url;

// Default configuration values
const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_CONFIG_FILE: &str = "tokengate.config.json";
const FALLBACK_CREDENTIALS_FILE: &str = "tokengate.credentials.json";

/// Main configuration struct for tokengate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Where credentials are persisted
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint path is joined to
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Credential persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the persisted pair
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
    /// Key the pair is stored under
    #[serde(default = "default_credentials_key")]
    pub key: String,
}

impl ApiConfig {
    /// Full URL for an endpoint path
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

// Default functions
fn default_base_url() -> String {
    std::env::var("TOKENGATE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

fn default_timeout() -> u64 {
    std::env::var("TOKENGATE_TIMEOUT_SECONDS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
}

fn default_credentials_path() -> PathBuf {
    if let Ok(path) = std::env::var("TOKENGATE_CREDENTIALS_PATH") {
        return PathBuf::from(path);
    }

    match dirs::config_dir() {
        Some(dir) => dir.join("tokengate").join("credentials.json"),
        None => PathBuf::from(FALLBACK_CREDENTIALS_FILE),
    }
}

fn default_credentials_key() -> String {
    std::env::var("TOKENGATE_CREDENTIALS_KEY")
        .unwrap_or_else(|_| DEFAULT_CREDENTIALS_KEY.to_string())
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
            key: default_credentials_key(),
        }
    }
}

/// Manages configuration for the application
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a configuration manager from `TOKENGATE_CONFIG_PATH`
    pub async fn new() -> Result<Self> {
        Self::from_path(get_config_path()).await
    }

    /// Create a configuration manager backed by `config_path`
    pub async fn from_path(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let config = load_or_create_config(&config_path).await?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a clone of the current configuration
    pub async fn get_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Update the configuration
    pub async fn update_config(&self, new_config: Config) -> Result<()> {
        *self.config.write().await = new_config.clone();
        save_config(&self.config_path, &new_config).await?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Load the application configuration
pub async fn load_config() -> Result<Config> {
    let config_manager = ConfigManager::new().await?;
    Ok(config_manager.get_config().await)
}

/// Get the path to the configuration file
fn get_config_path() -> PathBuf {
    std::env::var("TOKENGATE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load configuration from file or create default
async fn load_or_create_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let default_config = Config::default();
        save_config(path, &default_config).await?;
        info!("Created default configuration at {}", path.display());
        return Ok(default_config);
    }

    let config_str = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: Config = serde_json::from_str(&config_str)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Save configuration to file
async fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!("Saved configuration to {}", path.display());

    Ok(())
}
