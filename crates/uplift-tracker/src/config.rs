/*
[INPUT]:  YAML configuration file + UPLIFT__* environment overrides
[OUTPUT]: Validated tracker configuration
[POS]:    Configuration layer - gateway, pre-processing and CLI settings
[UPDATE]: When adding new configuration options
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uplift_adapter::http::DEFAULT_CHUNK_SIZE;
use uplift_adapter::{ClientConfig, PreprocessOptions};

use crate::lifecycle::{PreprocessFailurePolicy, RunnerSettings};

const ENV_PREFIX: &str = "UPLIFT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for the upload tracker
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Remote upload endpoint
    pub gateway: GatewayConfig,
    /// Local transform applied before transfer
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// Minimum delay between two progress log lines in the CLI
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

/// Upload endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Base URL of the upload API (e.g., "https://uploads.example.com/api/")
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Bytes per uploaded chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Pre-processing codec selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessCodec {
    None,
    Zlib,
}

/// Pre-processing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_codec")]
    pub codec: PreprocessCodec,
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,
    /// Output quality in (0, 1]
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default)]
    pub on_failure: PreprocessFailurePolicy,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            quality: default_quality(),
            on_failure: PreprocessFailurePolicy::default(),
        }
    }
}

fn default_progress_interval_ms() -> u64 {
    250
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_codec() -> PreprocessCodec {
    PreprocessCodec::Zlib
}

fn default_max_dimension() -> u32 {
    1000
}

fn default_quality() -> f32 {
    0.8
}

impl TrackerConfig {
    /// Load configuration from a YAML file, then apply `UPLIFT__*` overrides
    /// (e.g. `UPLIFT__GATEWAY__BASE_URL`).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(env_source())
            .build()?;
        Self::from_settings(settings)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?;
        Self::from_settings(settings)
    }

    /// `<config dir>/uplift/uplift.yaml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("uplift").join("uplift.yaml"))
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    fn from_settings(settings: config::Config) -> Result<Self, ConfigError> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.gateway.base_url).map_err(|err| {
            ConfigError::Invalid(format!("gateway.base_url {:?}: {err}", self.gateway.base_url))
        })?;
        if self.gateway.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "gateway.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "gateway.timeout_secs must be greater than zero".to_string(),
            ));
        }
        let quality = self.preprocess.quality;
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "preprocess.quality {quality} is outside (0, 1]"
            )));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.gateway.timeout_secs),
            connect_timeout: Duration::from_secs(self.gateway.connect_timeout_secs),
            chunk_size: self.gateway.chunk_size,
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            preprocess: PreprocessOptions {
                max_width: self.preprocess.max_width,
                max_height: self.preprocess.max_height,
                quality: self.preprocess.quality,
            },
            on_preprocess_failure: self.preprocess.on_failure,
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
