//! Model acquisition from a Hugging Face style hub.

pub mod manifest;
pub mod sync;
pub mod types;

pub use manifest::{FileSource, HubClient, ManifestClient, RemoteFile, RemoteRepository};
pub use sync::FileSyncEngine;
pub use types::{DownloadProgress, FileTarget, ManifestEntry, SyncTarget};
