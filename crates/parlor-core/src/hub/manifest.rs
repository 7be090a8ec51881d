//! Remote repository access: manifest listing and file fetch.
//!
//! `ManifestClient` and `FileSource` are the seams the sync engine and the
//! model store are written against. `HubClient` implements both over the
//! Hugging Face Hub HTTP API.

use super::types::{HubModelInfo, ManifestEntry};
use crate::config::NetworkConfig;
use crate::network::{api_client, join_url, streaming_client};
use crate::{ParlorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{debug, info};

/// Lists the files a repository holds at a revision.
///
/// Implementations do not retry and do not sort; ordering of the result is
/// unspecified.
#[async_trait]
pub trait ManifestClient: Send + Sync {
    async fn list(&self, repo_id: &str, revision: &str) -> Result<Vec<ManifestEntry>>;
}

/// An open remote file body.
pub struct RemoteFile {
    /// Length announced by the remote, if any.
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Opens repository files for streaming.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Open `path` at `revision`. Non-success responses are errors.
    async fn open(&self, repo_id: &str, revision: &str, path: &str) -> Result<RemoteFile>;
}

/// Everything the sync engine needs from a remote.
pub trait RemoteRepository: ManifestClient + FileSource {}

impl<T: ManifestClient + FileSource> RemoteRepository for T {}

/// Client for the Hugging Face Hub.
#[derive(Debug, Clone)]
pub struct HubClient {
    /// Request/response calls (total timeout)
    client: Client,
    /// File transfers (connect timeout only)
    download_client: Client,
    base_url: String,
}

impl HubClient {
    /// Client against the public hub.
    pub fn new() -> Result<Self> {
        Self::with_base_url(NetworkConfig::HUB_BASE)
    }

    /// Client against a hub mirror or a local test server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: api_client()?,
            download_client: streaming_client()?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Repository-info URL for a revision.
    pub fn manifest_url(&self, repo_id: &str, revision: &str) -> String {
        // repo_id is "owner/name"; its slash is part of the path and stays unencoded.
        join_url(
            &self.base_url,
            &format!(
                "api/models/{}/revision/{}",
                repo_id,
                urlencoding::encode(revision)
            ),
        )
    }

    /// Per-file resolve URL.
    pub fn resolve_url(&self, repo_id: &str, revision: &str, path: &str) -> String {
        let encoded_path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        join_url(
            &self.base_url,
            &format!(
                "{}/resolve/{}/{}",
                repo_id,
                urlencoding::encode(revision),
                encoded_path
            ),
        )
    }
}

#[async_trait]
impl ManifestClient for HubClient {
    async fn list(&self, repo_id: &str, revision: &str) -> Result<Vec<ManifestEntry>> {
        let url = self.manifest_url(repo_id, revision);
        debug!("Listing repository files: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParlorError::Network {
                message: format!("Failed to reach {}: {}", url, e),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParlorError::Network {
                message: format!("Failed listing repo files for {}: HTTP {}", repo_id, status),
                cause: None,
            });
        }

        let body = response.text().await.map_err(|e| ParlorError::Network {
            message: format!("Failed to read manifest body: {}", e),
            cause: Some(e.to_string()),
        })?;

        let info: HubModelInfo =
            serde_json::from_str(&body).map_err(|e| ParlorError::Protocol {
                message: format!("Unexpected manifest for {}: {}", repo_id, e),
            })?;

        info!(
            "Manifest for {}@{} lists {} files",
            repo_id,
            revision,
            info.siblings.len()
        );

        Ok(info
            .siblings
            .into_iter()
            .map(|s| ManifestEntry::new(s.rfilename))
            .collect())
    }
}

#[async_trait]
impl FileSource for HubClient {
    async fn open(&self, repo_id: &str, revision: &str, path: &str) -> Result<RemoteFile> {
        let url = self.resolve_url(repo_id, revision, path);
        debug!("Opening {}", url);

        let response = self
            .download_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParlorError::Network {
                message: format!("Download request failed for {}: {}", url, e),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParlorError::Network {
                message: format!("Failed to download file from {}: HTTP {}", url, status),
                cause: None,
            });
        }

        Ok(RemoteFile {
            content_length: response.content_length(),
            body: response.bytes_stream().map_err(ParlorError::from).boxed(),
        })
    }
}
