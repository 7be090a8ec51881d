//! Shared state behind an `Assistant`.

use crate::cancel::CancellationToken;
use crate::chat::{ConversationStore, Message, StreamOrchestrator};
use crate::config::EngineKind;
use crate::engine::{EngineSession, GeneratorBackend, NativeBackend};
use crate::hub::{DownloadProgress, FileSyncEngine, RemoteRepository};
use crate::settings::SettingsStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

/// Native runtimes the host application registered.
#[derive(Default, Clone)]
pub(crate) struct Backends {
    pub generator: Option<Arc<dyn GeneratorBackend>>,
    pub native: Option<Arc<dyn NativeBackend>>,
}

/// Slot holding the one active session.
///
/// Fair mutex: a waiting engine switch is served before the worker can start
/// another generation.
pub(crate) type EngineSlot = Arc<Mutex<Option<EngineSession>>>;

pub(crate) struct AssistantState {
    pub settings: SettingsStore,
    pub models_dir: PathBuf,
    pub remote: Arc<dyn RemoteRepository>,
    pub sync_engine: FileSyncEngine,
    pub backends: Backends,

    pub conversation: ConversationStore,
    pub orchestrator: Arc<StreamOrchestrator>,
    pub engine: EngineSlot,
    pub active_engine: watch::Sender<Option<EngineKind>>,
    /// Token of the generation in flight, or of the last one.
    pub current_cancel: Arc<Mutex<CancellationToken>>,
    pub system_prompt: Arc<RwLock<String>>,

    pub queue: mpsc::UnboundedSender<Message>,
    /// Messages sent but not yet fully handled by the worker.
    pub pending: Arc<watch::Sender<usize>>,

    pub download: watch::Sender<Option<DownloadProgress>>,
    /// Held for the length of a download; one sync per assistant at a time.
    pub download_lock: Mutex<()>,
}
