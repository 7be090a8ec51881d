//! Sequential file synchronization with typed progress.
//!
//! `FileSyncEngine::sync` returns a lazy stream: nothing is listed or
//! transferred until it is polled, and each poll advances the run by exactly
//! one event. Failures never escape as errors; they end the stream with a
//! single `DownloadProgress::Error`.

use super::manifest::RemoteRepository;
use super::types::{DownloadProgress, FileTarget, SyncTarget};
use crate::model_store::{is_file_complete, part_path, plan_single_file, plan_subfolder, PlannedFile};
use crate::{ParlorError, Result};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Files resolved for one run.
#[derive(Debug)]
struct SyncPlan {
    repo_id: String,
    revision: String,
    destination_dir: PathBuf,
    files: Vec<PlannedFile>,
}

/// Position of a run between two events.
enum Step {
    List(SyncTarget),
    Begin(SyncPlan),
    Announce { plan: Arc<SyncPlan>, index: usize },
    Fetch { plan: Arc<SyncPlan>, index: usize },
    Done,
}

/// Downloads missing or empty model files one at a time.
#[derive(Clone)]
pub struct FileSyncEngine {
    remote: Arc<dyn RemoteRepository>,
}

impl std::fmt::Debug for FileSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSyncEngine").finish_non_exhaustive()
    }
}

impl FileSyncEngine {
    pub fn new(remote: Arc<dyn RemoteRepository>) -> Self {
        Self { remote }
    }

    /// Mirror a repository subfolder into `target.destination_dir`.
    ///
    /// The stream is single-pass; calling `sync` again starts a new run.
    pub fn sync(&self, target: SyncTarget) -> BoxStream<'static, DownloadProgress> {
        self.run(Step::List(target))
    }

    /// Fetch one repository file into `target.destination_dir`.
    ///
    /// Yields the same envelope as [`sync`](Self::sync) with a total of one file.
    pub fn sync_file(&self, target: FileTarget) -> BoxStream<'static, DownloadProgress> {
        let first = match plan_single_file(&target.path) {
            Ok(file) => Step::Begin(SyncPlan {
                repo_id: target.repo_id,
                revision: target.revision,
                destination_dir: target.destination_dir,
                files: vec![file],
            }),
            Err(e) => {
                let event = fail(&target.repo_id, e).0;
                return stream::iter([event]).boxed();
            }
        };
        self.run(first)
    }

    fn run(&self, first: Step) -> BoxStream<'static, DownloadProgress> {
        let remote = self.remote.clone();
        stream::unfold((remote, first), |(remote, step)| async move {
            let (event, next) = advance(remote.as_ref(), step).await?;
            Some((event, (remote, next)))
        })
        .boxed()
    }
}

async fn advance(
    remote: &dyn RemoteRepository,
    step: Step,
) -> Option<(DownloadProgress, Step)> {
    match step {
        Step::List(target) => {
            let plan = match list_plan(remote, target.clone()).await {
                Ok(plan) => plan,
                Err(e) => return Some(fail(&target.repo_id, e)),
            };
            Some(begin(plan).await)
        }
        Step::Begin(plan) => Some(begin(plan).await),
        Step::Announce { plan, index } => Some(announce(plan, index)),
        Step::Fetch { plan, index } => match fetch_if_missing(remote, &plan, index).await {
            Ok(()) => Some(announce(plan, index + 1)),
            Err(e) => Some(fail(&plan.repo_id, e)),
        },
        Step::Done => None,
    }
}

async fn list_plan(remote: &dyn RemoteRepository, target: SyncTarget) -> Result<SyncPlan> {
    let entries = remote.list(&target.repo_id, &target.revision).await?;
    let files = plan_subfolder(entries, &target.subfolder)?;
    Ok(SyncPlan {
        repo_id: target.repo_id,
        revision: target.revision,
        destination_dir: target.destination_dir,
        files,
    })
}

async fn begin(plan: SyncPlan) -> (DownloadProgress, Step) {
    if let Err(e) = tokio::fs::create_dir_all(&plan.destination_dir).await {
        let err = ParlorError::io_with_path(e, &plan.destination_dir);
        return fail(&plan.repo_id, err);
    }

    info!(
        "Synchronizing {} file(s) from {} into {}",
        plan.files.len(),
        plan.repo_id,
        plan.destination_dir.display()
    );

    let event = DownloadProgress::ListingFiles {
        total_files: plan.files.len(),
    };
    (
        event,
        Step::Announce {
            plan: Arc::new(plan),
            index: 0,
        },
    )
}

fn announce(plan: Arc<SyncPlan>, index: usize) -> (DownloadProgress, Step) {
    match plan.files.get(index) {
        Some(file) => (
            DownloadProgress::DownloadingFile {
                current_index: index + 1,
                total_files: plan.files.len(),
                file_name: file.remote_path.clone(),
            },
            Step::Fetch { plan, index },
        ),
        None => {
            info!("Synchronized {} ({} files)", plan.repo_id, plan.files.len());
            (DownloadProgress::Success, Step::Done)
        }
    }
}

fn fail(repo_id: &str, err: ParlorError) -> (DownloadProgress, Step) {
    error!("Error synchronizing {}: {}", repo_id, err);
    (
        DownloadProgress::Error {
            message: err.to_string(),
        },
        Step::Done,
    )
}

async fn fetch_if_missing(remote: &dyn RemoteRepository, plan: &SyncPlan, index: usize) -> Result<()> {
    let file = &plan.files[index];
    let dest_path = plan.destination_dir.join(&file.local_name);

    if is_file_complete(&dest_path) {
        debug!("Skipping already-present file {}", file.local_name);
        return Ok(());
    }

    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ParlorError::io_with_path(e, parent))?;
    }

    let remote_file = remote
        .open(&plan.repo_id, &plan.revision, &file.remote_path)
        .await?;
    let part = part_path(&dest_path);

    let written = match write_body(remote_file.body, &part).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Some(expected) = remote_file.content_length {
        if written != expected {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ParlorError::IncompleteTransfer {
                path: dest_path,
                expected,
                written,
            });
        }
    }

    // A zero-length leftover at the final path would block the rename on some platforms.
    let _ = tokio::fs::remove_file(&dest_path).await;
    tokio::fs::rename(&part, &dest_path)
        .await
        .map_err(|e| ParlorError::io_with_path(e, &dest_path))?;

    info!("Downloaded {} ({} bytes)", file.remote_path, written);
    Ok(())
}

async fn write_body(
    mut body: BoxStream<'static, Result<bytes::Bytes>>,
    part: &Path,
) -> Result<u64> {
    let mut out = tokio::fs::File::create(part)
        .await
        .map_err(|e| ParlorError::io_with_path(e, part))?;
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        out.write_all(&chunk)
            .await
            .map_err(|e| ParlorError::io_with_path(e, part))?;
        written += chunk.len() as u64;
    }

    out.flush()
        .await
        .map_err(|e| ParlorError::io_with_path(e, part))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{FileSource, ManifestClient, ManifestEntry, RemoteFile};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory repository that counts transfers.
    #[derive(Default)]
    struct FakeRepo {
        files: HashMap<String, Vec<u8>>,
        offline: bool,
        failing: Option<String>,
        /// Announce more bytes than the body carries for this path.
        truncated: Option<String>,
        opened: Mutex<Vec<String>>,
        listings: AtomicUsize,
    }

    impl FakeRepo {
        fn with_files(paths: &[&str]) -> Self {
            Self {
                files: paths
                    .iter()
                    .map(|p| (p.to_string(), format!("contents of {}", p).into_bytes()))
                    .collect(),
                ..Default::default()
            }
        }

        fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ManifestClient for FakeRepo {
        async fn list(&self, _repo_id: &str, _revision: &str) -> Result<Vec<ManifestEntry>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                return Err(ParlorError::Network {
                    message: "connection refused".into(),
                    cause: None,
                });
            }
            // Reverse order so the engine has to sort
            let mut paths: Vec<_> = self.files.keys().cloned().collect();
            paths.sort();
            paths.reverse();
            Ok(paths.into_iter().map(ManifestEntry::new).collect())
        }
    }

    #[async_trait]
    impl FileSource for FakeRepo {
        async fn open(&self, _repo_id: &str, _revision: &str, path: &str) -> Result<RemoteFile> {
            self.opened.lock().unwrap().push(path.to_string());
            if self.failing.as_deref() == Some(path) {
                return Err(ParlorError::Network {
                    message: format!("HTTP 500 for {}", path),
                    cause: None,
                });
            }
            let data = self.files.get(path).cloned().ok_or_else(|| ParlorError::Network {
                message: format!("HTTP 404 for {}", path),
                cause: None,
            })?;
            let announced = if self.truncated.as_deref() == Some(path) {
                data.len() as u64 + 10
            } else {
                data.len() as u64
            };
            let chunks: Vec<Result<Bytes>> = data
                .chunks(4)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(RemoteFile {
                content_length: Some(announced),
                body: stream::iter(chunks).boxed(),
            })
        }
    }

    fn target(dir: &Path) -> SyncTarget {
        SyncTarget {
            repo_id: "owner/model".into(),
            revision: "main".into(),
            subfolder: "cpu".into(),
            destination_dir: dir.join("model"),
        }
    }

    async fn collect(engine: &FileSyncEngine, target: SyncTarget) -> Vec<DownloadProgress> {
        engine.sync(target).collect().await
    }

    #[tokio::test]
    async fn test_fresh_sync_event_sequence() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&[
            "cpu/tokenizer.json",
            "cpu/model.onnx",
            "cpu/genai_config.json",
            "gpu/model.onnx",
        ]));
        let engine = FileSyncEngine::new(repo.clone());

        let events = collect(&engine, target(temp.path())).await;

        assert_eq!(
            events,
            vec![
                DownloadProgress::ListingFiles { total_files: 3 },
                DownloadProgress::DownloadingFile {
                    current_index: 1,
                    total_files: 3,
                    file_name: "cpu/genai_config.json".into(),
                },
                DownloadProgress::DownloadingFile {
                    current_index: 2,
                    total_files: 3,
                    file_name: "cpu/model.onnx".into(),
                },
                DownloadProgress::DownloadingFile {
                    current_index: 3,
                    total_files: 3,
                    file_name: "cpu/tokenizer.json".into(),
                },
                DownloadProgress::Success,
            ]
        );

        let model_dir = temp.path().join("model");
        assert_eq!(
            std::fs::read(model_dir.join("model.onnx")).unwrap(),
            b"contents of cpu/model.onnx"
        );
        assert!(!model_dir.join("gpu").exists());
        assert!(!part_path(&model_dir.join("model.onnx")).exists());
    }

    #[tokio::test]
    async fn test_second_run_transfers_nothing() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&["cpu/a.bin", "cpu/b.bin"]));
        let engine = FileSyncEngine::new(repo.clone());

        let first = collect(&engine, target(temp.path())).await;
        assert_eq!(first.last(), Some(&DownloadProgress::Success));
        assert_eq!(repo.opened().len(), 2);

        let second = collect(&engine, target(temp.path())).await;
        assert_eq!(second.first(), Some(&DownloadProgress::ListingFiles { total_files: 2 }));
        assert_eq!(second.last(), Some(&DownloadProgress::Success));
        assert_eq!(second.len(), 4);
        assert_eq!(repo.opened().len(), 2, "no new transfers on the second run");
    }

    #[tokio::test]
    async fn test_zero_length_file_is_refetched() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&["cpu/a.bin", "cpu/b.bin"]));
        let engine = FileSyncEngine::new(repo.clone());
        let model_dir = temp.path().join("model");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("a.bin"), b"").unwrap();
        std::fs::write(model_dir.join("b.bin"), b"already here").unwrap();

        let events = collect(&engine, target(temp.path())).await;

        assert_eq!(events.last(), Some(&DownloadProgress::Success));
        assert_eq!(repo.opened(), vec!["cpu/a.bin".to_string()]);
        assert_eq!(std::fs::read(model_dir.join("b.bin")).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_failed_transfer_ends_with_single_error() {
        let temp = TempDir::new().unwrap();
        let mut repo = FakeRepo::with_files(&["cpu/a.bin", "cpu/b.bin", "cpu/c.bin"]);
        repo.failing = Some("cpu/b.bin".into());
        let repo = Arc::new(repo);
        let engine = FileSyncEngine::new(repo.clone());

        let events = collect(&engine, target(temp.path())).await;

        let errors = events
            .iter()
            .filter(|e| matches!(e, DownloadProgress::Error { .. }))
            .count();
        assert_eq!(errors, 1);
        assert!(!events.contains(&DownloadProgress::Success));
        assert!(events.last().unwrap().is_terminal());
        // c.bin was never attempted
        assert_eq!(repo.opened(), vec!["cpu/a.bin".to_string(), "cpu/b.bin".to_string()]);
        assert!(!temp.path().join("model").join("b.bin").exists());
    }

    #[tokio::test]
    async fn test_short_transfer_is_an_error_and_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let mut repo = FakeRepo::with_files(&["cpu/a.bin"]);
        repo.truncated = Some("cpu/a.bin".into());
        let engine = FileSyncEngine::new(Arc::new(repo));

        let events = collect(&engine, target(temp.path())).await;

        match events.last() {
            Some(DownloadProgress::Error { message }) => {
                assert!(message.contains("Incomplete transfer"), "{}", message)
            }
            other => panic!("expected error, got {:?}", other),
        }
        let dest = temp.path().join("model").join("a.bin");
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_listing_failure_is_single_error() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepo {
            offline: true,
            ..Default::default()
        };
        let engine = FileSyncEngine::new(Arc::new(repo));

        let events = collect(&engine, target(temp.path())).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DownloadProgress::Error { .. }));
        assert!(!temp.path().join("model").exists());
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&["cpu/a.bin"]));
        let engine = FileSyncEngine::new(repo.clone());

        let stream = engine.sync(target(temp.path()));
        assert_eq!(repo.listings.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(repo.listings.load(Ordering::SeqCst), 0);
        assert!(repo.opened().is_empty());
    }

    #[tokio::test]
    async fn test_empty_subfolder_match_still_succeeds() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&["gpu/a.bin"]));
        let engine = FileSyncEngine::new(repo);

        let events = collect(&engine, target(temp.path())).await;

        assert_eq!(
            events,
            vec![
                DownloadProgress::ListingFiles { total_files: 0 },
                DownloadProgress::Success
            ]
        );
        assert!(temp.path().join("model").is_dir());
    }

    #[tokio::test]
    async fn test_traversal_entry_aborts_run() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&["cpu/ok.bin", "cpu/../../escape.bin"]));
        let engine = FileSyncEngine::new(repo.clone());

        let events = collect(&engine, target(temp.path())).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DownloadProgress::Error { .. }));
        assert!(repo.opened().is_empty());
        assert!(!temp.path().join("escape.bin").exists());
    }

    #[tokio::test]
    async fn test_sync_file_envelope() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(FakeRepo::with_files(&["weights/model-Q4_0.gguf"]));
        let engine = FileSyncEngine::new(repo.clone());
        let file_target = FileTarget {
            repo_id: "owner/gguf".into(),
            revision: "main".into(),
            path: "weights/model-Q4_0.gguf".into(),
            destination_dir: temp.path().join("llama"),
        };

        let events: Vec<_> = engine.sync_file(file_target.clone()).collect().await;
        assert_eq!(
            events,
            vec![
                DownloadProgress::ListingFiles { total_files: 1 },
                DownloadProgress::DownloadingFile {
                    current_index: 1,
                    total_files: 1,
                    file_name: "weights/model-Q4_0.gguf".into(),
                },
                DownloadProgress::Success,
            ]
        );
        assert!(temp.path().join("llama").join("model-Q4_0.gguf").is_file());
        assert_eq!(repo.listings.load(Ordering::SeqCst), 0);

        let again: Vec<_> = engine.sync_file(file_target).collect().await;
        assert_eq!(again.last(), Some(&DownloadProgress::Success));
        assert_eq!(repo.opened().len(), 1);
    }
}
