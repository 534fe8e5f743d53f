//! Integration configuration.
//!
//! The loader hands us a JSON object with two keys, `integratedDirectory`
//! and `volumeLabel`. Missing keys fall back to the defaults below.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use directories::{BaseDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::{FsIntError, FsIntResult};

/// Placeholder expanded to the user's documents directory.
pub const MY_DOCUMENTS: &str = "$MyDocuments$";

/// Longest volume name the guest can display.
pub const MAX_VOLUME_LABEL: usize = 11;

/// Settings supplied by the plugin loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationConfig {
    /// Host directory exposed to the guest, may contain `$MyDocuments$`.
    pub integrated_directory: String,
    /// Label returned by the get-volume-label call.
    pub volume_label: String,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            integrated_directory: format!("{}/NestorMSX/FileSystem", MY_DOCUMENTS),
            volume_label: "NestorMSX".to_string(),
        }
    }
}

impl IntegrationConfig {
    /// Parse a JSON config, merging it over the defaults.
    pub fn from_json(json: &str) -> FsIntResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load_from(path: &Path) -> FsIntResult<Self> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_json(&content)
    }

    /// Check the values the guest will see.
    pub fn validate(&self) -> FsIntResult<()> {
        let label = &self.volume_label;
        if label.is_empty() || label.len() > MAX_VOLUME_LABEL || !label.is_ascii() {
            return Err(FsIntError::InvalidVolumeLabel(label.clone()));
        }
        if self.integrated_directory.trim().is_empty() {
            return Err(FsIntError::Config(
                "integratedDirectory must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve `integratedDirectory` to an absolute host path.
    pub fn base_path(&self) -> FsIntResult<PathBuf> {
        let expanded = self
            .integrated_directory
            .replace(MY_DOCUMENTS, &documents_dir().to_string_lossy());
        let path = split_host_path(&expanded);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }
}

/// The user's documents directory, or their home when there is none.
fn documents_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|d| d.document_dir().map(Path::to_path_buf))
        .or_else(|| BaseDirs::new().map(|d| d.home_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Build a host path from a string using either `/` or `\` separators.
fn split_host_path(raw: &str) -> PathBuf {
    let mut path = PathBuf::new();
    if raw.starts_with('/') || raw.starts_with('\\') {
        path.push(MAIN_SEPARATOR.to_string());
    }
    for (i, part) in raw.split(['/', '\\']).filter(|p| !p.is_empty()).enumerate() {
        if i == 0 && part.ends_with(':') {
            // Drive letter
            path.push(format!("{}{}", part, MAIN_SEPARATOR));
        } else {
            path.push(part);
        }
    }
    path
}
