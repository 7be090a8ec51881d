//! Shared types for manifest listing and file synchronization.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file known to the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Repository-relative path, e.g. `cpu/model.onnx`.
    pub relative_path: String,
}

impl ManifestEntry {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
        }
    }
}

/// A repository subfolder to mirror into a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub repo_id: String,
    pub revision: String,
    /// Repository subfolder; empty selects the whole repository.
    pub subfolder: String,
    pub destination_dir: PathBuf,
}

/// A single repository file to place into a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub repo_id: String,
    pub revision: String,
    /// Repository-relative path of the file.
    pub path: String,
    pub destination_dir: PathBuf,
}

/// Progress of one synchronization run.
///
/// A run yields `ListingFiles` once, then one `DownloadingFile` per targeted
/// file, and ends with exactly one of `Success` or `Error`. Nothing follows a
/// terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DownloadProgress {
    ListingFiles {
        total_files: usize,
    },
    DownloadingFile {
        /// 1-based position within the run.
        current_index: usize,
        total_files: usize,
        /// Repository-relative path of the file.
        file_name: String,
    },
    Success,
    Error {
        message: String,
    },
}

impl DownloadProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadProgress::Success | DownloadProgress::Error { .. })
    }
}

/// Model info document returned by the hub's repository-info endpoint.
///
/// Only the sibling list is read; every other field is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct HubModelInfo {
    pub siblings: Vec<HubSibling>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HubSibling {
    pub rfilename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(DownloadProgress::Success.is_terminal());
        assert!(DownloadProgress::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(!DownloadProgress::ListingFiles { total_files: 3 }.is_terminal());
    }

    #[test]
    fn test_progress_serializes_tagged() {
        let event = DownloadProgress::DownloadingFile {
            current_index: 2,
            total_files: 5,
            file_name: "cpu/model.onnx".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "downloading_file");
        assert_eq!(json["current_index"], 2);
    }

    #[test]
    fn test_model_info_ignores_unknown_fields() {
        let body = r#"{
            "id": "microsoft/Phi-4-mini-instruct-onnx",
            "sha": "abc123",
            "siblings": [{"rfilename": "README.md"}, {"rfilename": "cpu/model.onnx", "size": 12}]
        }"#;
        let info: HubModelInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.siblings.len(), 2);
        assert_eq!(info.siblings[1].rfilename, "cpu/model.onnx");
    }
}
