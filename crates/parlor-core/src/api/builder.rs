//! Builder for configuring Assistant initialization.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

use super::state::{AssistantState, Backends};
use super::worker::ChatWorker;
use crate::cancel::CancellationToken;
use crate::chat::{ConversationStore, StreamOrchestrator};
use crate::config::{NetworkConfig, PathsConfig};
use crate::engine::{GeneratorBackend, NativeBackend};
use crate::error::{ParlorError, Result};
use crate::hub::{FileSyncEngine, HubClient, RemoteRepository};
use crate::settings::SettingsStore;
use crate::Assistant;

/// Builder for configuring Assistant initialization.
///
/// # Example
///
/// ```rust,ignore
/// use parlor_core::Assistant;
///
/// let assistant = Assistant::builder("./parlor-data")
///     .hub_base_url("https://hf-mirror.example")
///     .with_greeting(false)
///     .build()
///     .await?;
/// ```
pub struct AssistantBuilder {
    data_dir: PathBuf,
    hub_base_url: Option<String>,
    remote: Option<Arc<dyn RemoteRepository>>,
    backends: Backends,
    system_prompt: Option<String>,
    greeting: bool,
}

impl AssistantBuilder {
    /// Create a new builder with the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            hub_base_url: None,
            remote: None,
            backends: Backends::default(),
            system_prompt: None,
            greeting: true,
        }
    }

    /// Download from a hub mirror instead of the public hub.
    pub fn hub_base_url(mut self, url: impl Into<String>) -> Self {
        self.hub_base_url = Some(url.into());
        self
    }

    /// Use a custom remote repository. Takes precedence over `hub_base_url`.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteRepository>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Register the runtime `EngineKind::Onnx` sessions are built on.
    pub fn with_generator_backend(mut self, backend: Arc<dyn GeneratorBackend>) -> Self {
        self.backends.generator = Some(backend);
        self
    }

    /// Register the runtime `EngineKind::Native` sessions are built on.
    pub fn with_native_backend(mut self, backend: Arc<dyn NativeBackend>) -> Self {
        self.backends.native = Some(backend);
        self
    }

    /// Override the persisted system prompt for this instance only.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Open the conversation with the welcome message.
    ///
    /// Default: `true`
    pub fn with_greeting(mut self, enable: bool) -> Self {
        self.greeting = enable;
        self
    }

    /// Build the Assistant and start its chat worker.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<Assistant> {
        let models_dir = self.data_dir.join(PathsConfig::MODELS_DIR_NAME);
        tokio::fs::create_dir_all(&models_dir).await.map_err(|e| ParlorError::Io {
            message: format!("Failed to create directory: {}", models_dir.display()),
            path: Some(models_dir.clone()),
            source: Some(e),
        })?;

        let settings = SettingsStore::new(&self.data_dir);
        let saved = settings.load()?;
        let system_prompt = self.system_prompt.unwrap_or(saved.system_prompt);

        let remote: Arc<dyn RemoteRepository> = match self.remote {
            Some(remote) => remote,
            None => {
                let base = self
                    .hub_base_url
                    .unwrap_or_else(|| NetworkConfig::HUB_BASE.to_string());
                Arc::new(HubClient::with_base_url(base)?)
            }
        };

        let conversation = if self.greeting {
            ConversationStore::with_greeting()
        } else {
            ConversationStore::new()
        };
        let orchestrator = Arc::new(StreamOrchestrator::new(conversation.clone()));
        let engine = Arc::new(Mutex::new(None));
        let current_cancel = Arc::new(Mutex::new(CancellationToken::new()));
        let system_prompt = Arc::new(RwLock::new(system_prompt));
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let (queue, rx) = mpsc::unbounded_channel();

        let worker = ChatWorker {
            conversation: conversation.clone(),
            orchestrator: orchestrator.clone(),
            engine: engine.clone(),
            current_cancel: current_cancel.clone(),
            system_prompt: system_prompt.clone(),
            pending: pending.clone(),
        };
        tokio::spawn(worker.run(rx));

        let (active_engine, _) = watch::channel(None);
        let (download, _) = watch::channel(None);

        tracing::info!("Assistant ready (data dir {})", self.data_dir.display());

        Ok(Assistant {
            data_dir: self.data_dir,
            state: Arc::new(AssistantState {
                settings,
                models_dir,
                sync_engine: FileSyncEngine::new(remote.clone()),
                remote,
                backends: self.backends,
                conversation,
                orchestrator,
                engine,
                active_engine,
                current_cancel,
                system_prompt,
                queue,
                pending,
                download,
                download_lock: Mutex::new(()),
            }),
        })
    }
}
