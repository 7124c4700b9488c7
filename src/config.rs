//! Runtime configuration
//!
//! Defaults, optionally overlaid by a YAML file, then by `SKC_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LedgerResult;

/// Extensions accepted for spreadsheet import (plain and macro-enabled)
pub const WORKBOOK_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];

/// Extensions accepted for product images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub export_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub busy_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("skc_ledger.db"),
            upload_dir: PathBuf::from("uploads"),
            export_dir: PathBuf::from("uploads").join("exports"),
            max_upload_bytes: 16 * 1024 * 1024,
            busy_timeout_ms: 5000,
        }
    }
}

impl LedgerConfig {
    /// Load from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> LedgerResult<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_yaml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup("SKC_DATABASE") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(dir) = lookup("SKC_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SKC_EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
    }

    /// Staging area for uploaded workbooks awaiting import
    pub fn temp_dir(&self) -> PathBuf {
        self.upload_dir.join("temp")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.upload_dir.join("images")
    }

    /// Config rooted under a single directory
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            database_path: root.join("skc_ledger.db"),
            upload_dir: root.join("uploads"),
            export_dir: root.join("uploads").join("exports"),
            ..Self::default()
        }
    }
}

/// Case-insensitive extension check
pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
