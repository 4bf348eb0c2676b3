use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::digest::DigestAlgorithm;
use crate::error::{BakeError, Result};

/// Bake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Output format written by the store
    pub output: OutputKind,

    /// Algorithm used for every digest the build computes
    pub digest_algorithm: DigestAlgorithm,

    /// Also write a docker-compatible manifest.json (layout output only)
    pub docker_manifest: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            output: OutputKind::Layout,
            digest_algorithm: DigestAlgorithm::Sha256,
            docker_manifest: false,
            log_level: LogLevel::Warn,
        }
    }
}

impl BakeConfig {
    /// Load a configuration file. `.json` files are read as JSON, anything
    /// else as YAML. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BakeError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config = if is_json {
            serde_json::from_str(&content)?
        } else if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }
}

/// On-disk output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// OCI image layout directory
    #[default]
    Layout,
    /// Registry storage tree
    Registry,
}

impl std::str::FromStr for OutputKind {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "layout" => Ok(Self::Layout),
            "registry" => Ok(Self::Registry),
            other => Err(BakeError::ConfigError(format!(
                "Unknown output format '{}' (expected layout or registry)",
                other
            ))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
