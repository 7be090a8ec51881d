//! On-disk footprint of a model.
//!
//! This module is the only place that knows how repository paths map to local
//! paths: which manifest entries belong to a model, what they are called on
//! disk, and what counts as a complete file. The sync engine plans its
//! transfers with the same functions the completeness check uses.

use crate::config::{ModelPreset, NetworkConfig, PresetLayout};
use crate::hub::{FileTarget, ManifestClient, ManifestEntry, SyncTarget};
use crate::{ParlorError, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// One manifest entry scheduled for a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Repository-relative path.
    pub remote_path: String,
    /// Path relative to the destination directory.
    pub local_name: String,
}

/// Select the entries under `subfolder`, sorted by path, with the subfolder
/// prefix stripped for their local names.
///
/// An empty subfolder selects every entry. Entries whose local name would
/// escape the destination directory are rejected.
pub fn plan_subfolder(entries: Vec<ManifestEntry>, subfolder: &str) -> Result<Vec<PlannedFile>> {
    let trimmed = subfolder.trim_matches('/');
    let prefix = if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    };

    let mut paths: Vec<String> = entries
        .into_iter()
        .map(|e| e.relative_path)
        .filter(|p| p.starts_with(&prefix) && p.len() > prefix.len())
        .collect();
    paths.sort();
    paths.dedup();

    paths
        .into_iter()
        .map(|remote_path| {
            let local_name = remote_path[prefix.len()..].to_string();
            validate_local_name(&local_name)?;
            Ok(PlannedFile {
                remote_path,
                local_name,
            })
        })
        .collect()
}

/// Plan for a single-file target: the file keeps its last path component.
pub fn plan_single_file(path: &str) -> Result<PlannedFile> {
    let local_name = path.rsplit('/').next().unwrap_or(path).to_string();
    validate_local_name(&local_name)?;
    Ok(PlannedFile {
        remote_path: path.to_string(),
        local_name,
    })
}

fn validate_local_name(local_name: &str) -> Result<()> {
    let path = Path::new(local_name);
    let is_safe = !local_name.is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if is_safe {
        Ok(())
    } else {
        Err(ParlorError::Protocol {
            message: format!("Refusing manifest entry outside the model directory: {}", local_name),
        })
    }
}

/// A file is complete when it exists and is not empty.
pub fn is_file_complete(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Temporary path a transfer writes to before it is moved into place.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Check that every file the filtered manifest names is present and non-empty.
///
/// Returns `false` when the manifest cannot be fetched: completeness cannot be
/// asserted without reaching the repository. Extra local files are ignored.
pub async fn is_complete<M>(manifest: &M, target: &SyncTarget) -> bool
where
    M: ManifestClient + ?Sized,
{
    let entries = match manifest.list(&target.repo_id, &target.revision).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot verify {} without its manifest: {}", target.repo_id, e);
            return false;
        }
    };

    let planned = match plan_subfolder(entries, &target.subfolder) {
        Ok(planned) => planned,
        Err(e) => {
            warn!("Manifest for {} is unusable: {}", target.repo_id, e);
            return false;
        }
    };

    planned.iter().all(|file| {
        let complete = is_file_complete(&target.destination_dir.join(&file.local_name));
        if !complete {
            debug!("Missing or empty: {}", file.local_name);
        }
        complete
    })
}

/// How a model's files are selected from its repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLayout {
    Subfolder { subfolder: String },
    SingleFile { path: String },
}

/// What to run to acquire a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Subfolder(SyncTarget),
    SingleFile(FileTarget),
}

/// Filesystem view of one model.
#[derive(Debug, Clone)]
pub struct LocalModelStore {
    directory: PathBuf,
    repo_id: String,
    revision: String,
    layout: ModelLayout,
}

impl LocalModelStore {
    pub fn new(
        directory: impl Into<PathBuf>,
        repo_id: impl Into<String>,
        revision: impl Into<String>,
        layout: ModelLayout,
    ) -> Self {
        Self {
            directory: directory.into(),
            repo_id: repo_id.into(),
            revision: revision.into(),
            layout,
        }
    }

    /// Store for a packaged preset under `models_root`.
    pub fn for_preset(models_root: impl AsRef<Path>, preset: ModelPreset) -> Self {
        let layout = match preset.layout() {
            PresetLayout::Subfolder(subfolder) => ModelLayout::Subfolder {
                subfolder: subfolder.to_string(),
            },
            PresetLayout::SingleFile(path) => ModelLayout::SingleFile {
                path: path.to_string(),
            },
        };
        Self::new(
            models_root.as_ref().join(preset.local_dir_name()),
            preset.repo_id(),
            preset.revision(),
            layout,
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    /// Local path of a file inside the model directory.
    pub fn resolve_path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    /// The path an inference adapter loads: the directory for subfolder
    /// layouts, the file itself for single-file layouts.
    pub fn model_path(&self) -> PathBuf {
        match &self.layout {
            ModelLayout::Subfolder { .. } => self.directory.clone(),
            ModelLayout::SingleFile { path } => {
                let name = path.rsplit('/').next().unwrap_or(path);
                self.resolve_path(name)
            }
        }
    }

    pub fn acquisition(&self) -> Acquisition {
        match &self.layout {
            ModelLayout::Subfolder { subfolder } => Acquisition::Subfolder(SyncTarget {
                repo_id: self.repo_id.clone(),
                revision: self.revision.clone(),
                subfolder: subfolder.clone(),
                destination_dir: self.directory.clone(),
            }),
            ModelLayout::SingleFile { path } => Acquisition::SingleFile(FileTarget {
                repo_id: self.repo_id.clone(),
                revision: self.revision.clone(),
                path: path.clone(),
                destination_dir: self.directory.clone(),
            }),
        }
    }

    /// Whether every file of this model is on disk.
    ///
    /// Single-file layouts are checked locally; subfolder layouts consult the
    /// manifest as described on [`is_complete`].
    pub async fn is_complete<M>(&self, manifest: &M) -> bool
    where
        M: ManifestClient + ?Sized,
    {
        match self.acquisition() {
            Acquisition::Subfolder(target) => {
                if !self.directory.is_dir() {
                    return false;
                }
                is_complete(manifest, &target).await
            }
            Acquisition::SingleFile(_) => is_file_complete(&self.model_path()),
        }
    }
}
