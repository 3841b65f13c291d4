// Configuration Storage Service
// Handles config file read/write, version backup and runtime settings resolution

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::providers::{
    resolve_api_key_with, ApiKeySource, API_URL_ENV_VAR, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, OPENAI_DEFAULT_URL,
};

pub const CONFIG_VERSION: &str = "1";
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
const MAX_BACKUPS: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("No config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            artifact_dir: None,
            llm: LlmConfig::default(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

fn default_version() -> String { CONFIG_VERSION.to_string() }

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmOverrides<'a> {
    pub api_key: Option<&'a str>,
    pub model: Option<&'a str>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved generative-service settings. `api_key == None` means disabled.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub key_source: Option<ApiKeySource>,
    pub model: String,
    pub chat_url: String,
    pub temperature: f64,
    pub timeout: Duration,
    pub proxy: Option<String>,
}

impl AppConfig {
    pub fn llm_settings(&self, overrides: LlmOverrides<'_>) -> LlmSettings {
        self.llm_settings_with(overrides, |var| env::var(var).ok())
    }

    pub fn llm_settings_with<F>(&self, overrides: LlmOverrides<'_>, env_lookup: F) -> LlmSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = resolve_api_key_with(overrides.api_key, self.llm.api_key.as_deref(), &env_lookup);
        let (api_key, key_source) = match resolved {
            Some((key, source)) => (Some(key), Some(source)),
            None => (None, None),
        };

        let model = overrides
            .model
            .map(str::to_string)
            .or_else(|| self.llm.model.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let chat_url = self
            .llm
            .base_url
            .clone()
            .or_else(|| env_lookup(API_URL_ENV_VAR))
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());

        let temperature = match self.llm.temperature {
            Some(t) if (0.0..=2.0).contains(&t) => t,
            Some(t) => {
                warn!("[CONFIG] temperature {} out of range, using {}", t, DEFAULT_TEMPERATURE);
                DEFAULT_TEMPERATURE
            }
            None => DEFAULT_TEMPERATURE,
        };

        let timeout_secs = overrides
            .timeout_secs
            .or(self.llm.timeout_secs)
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let proxy = self
            .proxy
            .as_ref()
            .filter(|p| p.enabled)
            .and_then(|p| p.https.clone().or_else(|| p.http.clone()));

        LlmSettings {
            api_key,
            key_source,
            model,
            chat_url,
            temperature,
            timeout: Duration::from_secs(timeout_secs),
            proxy,
        }
    }

    /// Flag (or its env var) beats the config file, which beats `./artifacts`.
    pub fn resolve_artifact_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.artifact_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR))
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("content-forensics"))
    }

    pub fn open_default() -> Result<Self, ConfigError> {
        Self::default_config_dir()
            .map(Self::new)
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(|source| ConfigError::Io {
            path: self.config_dir.clone(),
            source,
        })
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(|source| ConfigError::Io {
            path: self.config_file.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.config_file.clone(),
            source,
        })
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        // Create backup if file exists
        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;

        fs::write(&self.config_file, content).map_err(|source| ConfigError::Io {
            path: self.config_file.clone(),
            source,
        })?;
        info!("[CONFIG] Saved {}", self.config_file.display());
        Ok(())
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(|source| ConfigError::Io {
            path: backup_dir.clone(),
            source,
        })?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(|source| ConfigError::Io {
            path: backup_file.clone(),
            source,
        })?;

        self.cleanup_old_backups(&backup_dir, MAX_BACKUPS)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|source| ConfigError::Io {
                path: backup_dir.to_path_buf(),
                source,
            })?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Timestamped names sort chronologically.
        entries.sort_by_key(|e| e.file_name());

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    fn update<F>(&self, apply: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.load()?;
        apply(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    pub fn set_api_key(&self, key: &str) -> Result<(), ConfigError> {
        self.update(|c| c.llm.api_key = Some(key.trim().to_string()))
            .map(|_| ())
    }

    pub fn delete_api_key(&self) -> Result<(), ConfigError> {
        self.update(|c| c.llm.api_key = None).map(|_| ())
    }

    pub fn set_artifact_dir(&self, dir: &Path) -> Result<(), ConfigError> {
        self.update(|c| c.artifact_dir = Some(dir.to_path_buf()))
            .map(|_| ())
    }

    pub fn set_model(&self, model: &str) -> Result<(), ConfigError> {
        self.update(|c| c.llm.model = Some(model.trim().to_string()))
            .map(|_| ())
    }
}
