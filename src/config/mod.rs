//! Configuration management for BatchScale

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{Result, BatchScaleError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Batch processing settings
    pub processing: ProcessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// How the files of a batch are scheduled
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// One file at a time in discovery order, abort on first failure
    Sequential,
    /// One task per file, bounded by `max_concurrent`, report after all settle
    #[default]
    Concurrent,
}

impl ConcurrencyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Scheduling strategy for a batch
    pub mode: ConcurrencyMode,

    /// Files in flight in concurrent mode (None = logical CPU count)
    pub max_concurrent: Option<usize>,

    /// Match `.PNG`, `.Jpg`, ... as well as the lowercase extensions
    pub case_insensitive_extensions: bool,

    /// Delete an output file that was created but never fully written
    pub remove_partial_output: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            mode: ConcurrencyMode::Concurrent,
            max_concurrent: None,
            case_insensitive_extensions: false,
            remove_partial_output: true,
        }
    }
}

impl ProcessingConfig {
    /// Effective concurrency limit for concurrent mode
    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or env-filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BatchScaleError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let config: Config = match extension_of(path.as_ref()).as_str() {
            "toml" => toml::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            _ => return Err(BatchScaleError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match extension_of(path.as_ref()).as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| BatchScaleError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| BatchScaleError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(BatchScaleError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| BatchScaleError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_concurrent == Some(0) {
            return Err(BatchScaleError::config(
                "max_concurrent must be greater than 0"
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(BatchScaleError::config("Log level must not be empty"));
        }

        Ok(())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}
