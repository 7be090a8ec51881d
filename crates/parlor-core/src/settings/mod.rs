//! Persisted user settings.
//!
//! A single JSON document under the data root records which engine the user
//! selected, the system prompt, and the address of an inference server.

pub mod atomic;

use crate::config::{EngineKind, GenerationConfig, PathsConfig};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// User-editable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Engine kind name, see [`EngineKind::as_str`].
    pub selected_engine: String,
    pub system_prompt: String,
    pub server_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_engine: EngineKind::default().as_str().to_string(),
            system_prompt: GenerationConfig::DEFAULT_SYSTEM_PROMPT.to_string(),
            server_url: GenerationConfig::DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl Settings {
    /// The selected engine, falling back to the default for unknown names.
    pub fn engine_kind(&self) -> EngineKind {
        EngineKind::from_str(&self.selected_engine).unwrap_or_default()
    }
}

/// File-backed settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store rooted at `data_dir/settings.json`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(PathsConfig::SETTINGS_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, returning defaults when nothing has been saved yet.
    pub fn load(&self) -> Result<Settings> {
        Ok(atomic::read_json(&self.path)?.unwrap_or_default())
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        atomic::write_json(&self.path, settings)
    }

    /// Load, modify and save in one step.
    pub fn update<F>(&self, f: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        info!("Settings updated at {}", self.path.display());
        Ok(settings)
    }
}
