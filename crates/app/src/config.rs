use std::path::{Path, PathBuf};

use mledger_core::ReconcileOptions;
use mledger_import::ParserConfig;
use mledger_pdf::PasswordPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Every knob of a pipeline run. Missing sections fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Documents processed at once by the batch driver.
    pub workers: usize,
    /// Tesseract language code.
    pub ocr_language: String,
    pub parser: ParserConfig,
    pub passwords: PasswordPolicy,
    pub reconcile: ReconcileOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            ocr_language: "eng".to_string(),
            parser: ParserConfig::default(),
            passwords: PasswordPolicy::default(),
            reconcile: ReconcileOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }
}
