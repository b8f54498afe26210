//! User settings consumed by the pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

/// Aggregate attachment size ceiling per message (25 MB).
pub const ATTACHMENT_SIZE_LIMIT: u64 = 25 * 1024 * 1024;

/// Ceiling under which an `.asc` attachment is parsed as a public key (50 KB).
pub const LARGE_KEY_SIZE: u64 = 50 * 1024;

/// Settings that persist across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Resolve `cid:` images without asking.
    pub show_embedded_images: bool,
    /// Load remote content without asking.
    pub show_remote_images: bool,
    /// Aggregate attachment size ceiling in bytes.
    pub attachment_size_limit: u64,
    /// Size ceiling for `.asc` key attachments in bytes.
    pub large_key_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_embedded_images: false,
            show_remote_images: false,
            attachment_size_limit: ATTACHMENT_SIZE_LIMIT,
            large_key_size: LARGE_KEY_SIZE,
        }
    }
}

impl Settings {
    /// Default settings file location (`<config dir>/sealmail/settings.json`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sealmail")
            .join("settings.json")
    }

    /// Loads settings from `path`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// User-facing text shown when the size ceiling is exceeded.
    #[must_use]
    pub fn size_limit_message(&self) -> String {
        format!(
            "Attachments are limited to {} MB.",
            self.attachment_size_limit / (1024 * 1024)
        )
    }
}
