//! Parlor Core - Headless library for local model acquisition and streaming chat.
//!
//! This crate downloads packaged models from a Hugging Face style hub with
//! observable progress, and drives a multi-turn conversation against whichever
//! inference engine is active, publishing the reply as it streams in.
//!
//! # Example
//!
//! ```rust,ignore
//! use parlor_core::{Assistant, EngineKind, ModelPreset, RetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> parlor_core::Result<()> {
//!     let assistant = Assistant::new("/path/to/parlor").await?;
//!
//!     if !assistant.is_model_available(ModelPreset::Phi4MiniOnnx).await {
//!         assistant
//!             .download_model(ModelPreset::Phi4MiniOnnx, &RetryConfig::new().with_max_attempts(3))
//!             .await?;
//!     }
//!
//!     assistant.switch_engine(EngineKind::Server).await?;
//!     assistant.send_text("Hello!")?;
//!     assistant.wait_idle().await;
//!     println!("{:?}", assistant.conversation().first());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod model_store;
pub mod network;
pub mod settings;

mod api;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use chat::{
    ConversationStore, GenerationOutcome, GenerationPhase, Message, Role, StreamOrchestrator,
    TokenSet,
};
pub use config::{EngineKind, ModelPreset};
pub use engine::{EngineSession, InferenceAdapter, SessionState};
pub use error::{GenerationFault, ParlorError, Result};
pub use hub::{DownloadProgress, FileSyncEngine, HubClient, ManifestClient, SyncTarget};
pub use model_store::LocalModelStore;
pub use network::RetryConfig;
pub use settings::{Settings, SettingsStore};

// Re-export builder from api module
pub use api::AssistantBuilder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use api::AssistantState;

/// Main entry point for Parlor.
///
/// Owns the conversation, the active engine session and the download state
/// for one data directory. Methods are spread over the `api` submodules.
/// Dropping the last handle stops the chat worker.
pub struct Assistant {
    /// Root directory for settings and models
    data_dir: PathBuf,
    state: Arc<AssistantState>,
}

impl Assistant {
    /// Create a builder for Assistant.
    pub fn builder(data_dir: impl Into<PathBuf>) -> AssistantBuilder {
        AssistantBuilder::new(data_dir)
    }

    /// Create an Assistant with default options over `data_dir`.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        AssistantBuilder::new(data_dir).build().await
    }

    /// The platform data directory, e.g. `~/.local/share/parlor` on Linux.
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(config::PathsConfig::APP_DIR_NAME))
            .ok_or_else(|| ParlorError::Config {
                message: "no platform data directory; pass one explicitly".into(),
            })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn models_dir(&self) -> &Path {
        &self.state.models_dir
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.state.settings
    }
}
