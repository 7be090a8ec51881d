//! Model acquisition methods for Assistant.

use crate::config::ModelPreset;
use crate::error::{ParlorError, Result};
use crate::hub::DownloadProgress;
use crate::model_store::{Acquisition, LocalModelStore};
use crate::network::RetryConfig;
use crate::Assistant;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

impl Assistant {
    /// On-disk view of a packaged model.
    pub fn model_store(&self, preset: ModelPreset) -> LocalModelStore {
        LocalModelStore::for_preset(&self.state.models_dir, preset)
    }

    /// Whether every file of `preset` is present locally.
    pub async fn is_model_available(&self, preset: ModelPreset) -> bool {
        self.model_store(preset)
            .is_complete(self.state.remote.as_ref())
            .await
    }

    /// Download `preset`, publishing every event to `subscribe_download`.
    ///
    /// A run ending in `Error` is repeated as a whole, up to
    /// `retry.max_attempts` runs in total; each run emits its own complete
    /// event sequence. Returns the terminal event of the last run.
    pub async fn download_model(
        &self,
        preset: ModelPreset,
        retry: &RetryConfig,
    ) -> Result<DownloadProgress> {
        let _guard = self.state.download_lock.try_lock().map_err(|_| ParlorError::Validation {
            field: "download".into(),
            message: "a download is already running".into(),
        })?;

        let store = self.model_store(preset);
        let mut run = 1;
        loop {
            let mut events = match store.acquisition() {
                Acquisition::Subfolder(target) => self.state.sync_engine.sync(target),
                Acquisition::SingleFile(target) => self.state.sync_engine.sync_file(target),
            };

            let mut last = None;
            while let Some(event) = events.next().await {
                self.state.download.send_replace(Some(event.clone()));
                last = Some(event);
            }

            let last = last.ok_or_else(|| ParlorError::Protocol {
                message: "download ended without a terminal event".into(),
            })?;

            match &last {
                DownloadProgress::Error { message } if retry.allows_run_after(run) => {
                    let delay = retry.delay_before(run + 1);
                    warn!(
                        "Download of {} failed (run {}/{}): {}; retrying in {:?}",
                        preset, run, retry.max_attempts, message, delay
                    );
                    tokio::time::sleep(delay).await;
                    run += 1;
                }
                _ => {
                    info!("Download of {} finished: {:?}", preset, last);
                    return Ok(last);
                }
            }
        }
    }

    /// Latest download event; `None` before the first download.
    pub fn subscribe_download(&self) -> watch::Receiver<Option<DownloadProgress>> {
        self.state.download.subscribe()
    }
}
