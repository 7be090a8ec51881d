//! Engine selection methods for Assistant.

use std::path::{Path, PathBuf};

use crate::config::EngineKind;
use crate::engine::{EngineSession, InferenceAdapter, NativeAdapter, OnnxAdapter, ServerAdapter};
use crate::error::{ParlorError, Result};
use crate::model_store::LocalModelStore;
use crate::Assistant;
use tokio::sync::watch;
use tracing::{info, warn};

impl Assistant {
    /// Replace the active engine with a fresh session of `kind`.
    ///
    /// The reply in flight is cancelled first and keeps its partial text. On
    /// a load failure no engine is active afterwards; the conversation is left
    /// untouched and the error is returned.
    pub async fn switch_engine(&self, kind: EngineKind) -> Result<()> {
        let (adapter, path) = self.build_adapter(kind)?;
        self.activate(adapter, &path).await?;

        let name = kind.as_str().to_string();
        if let Err(e) = self.state.settings.update(move |s| s.selected_engine = name) {
            warn!("Engine switched but not persisted: {}", e);
        }
        Ok(())
    }

    /// Replace the active engine with `adapter`, loaded from `path`.
    pub async fn activate(&self, adapter: Box<dyn InferenceAdapter>, path: &Path) -> Result<()> {
        let current = self.state.current_cancel.lock().await;
        current.cancel();
        let mut slot = self.state.engine.lock().await;
        drop(current);

        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        self.state.active_engine.send_replace(None);

        let kind = adapter.kind();
        let session = EngineSession::open(adapter, path).await?;
        *slot = Some(session);
        self.state.active_engine.send_replace(Some(kind));
        info!("Active engine: {}", kind);
        Ok(())
    }

    pub fn active_engine(&self) -> Option<EngineKind> {
        *self.state.active_engine.borrow()
    }

    pub fn subscribe_engine(&self) -> watch::Receiver<Option<EngineKind>> {
        self.state.active_engine.subscribe()
    }

    fn build_adapter(&self, kind: EngineKind) -> Result<(Box<dyn InferenceAdapter>, PathBuf)> {
        let model_path = || {
            kind.preset()
                .map(|preset| LocalModelStore::for_preset(&self.state.models_dir, preset).model_path())
                .ok_or_else(|| ParlorError::Config {
                    message: format!("{} engine has no packaged model", kind),
                })
        };

        match kind {
            EngineKind::Onnx => {
                let backend = self.state.backends.generator.clone().ok_or_else(|| {
                    ParlorError::Config {
                        message: "no generator runtime is registered".into(),
                    }
                })?;
                Ok((Box::new(OnnxAdapter::new(backend)), model_path()?))
            }
            EngineKind::Native => {
                let backend = self.state.backends.native.clone().ok_or_else(|| {
                    ParlorError::Config {
                        message: "no native runtime is registered".into(),
                    }
                })?;
                Ok((Box::new(NativeAdapter::new(backend)), model_path()?))
            }
            EngineKind::Server => {
                let url = self.state.settings.load()?.server_url;
                let adapter = ServerAdapter::new(url.clone())?;
                Ok((Box::new(adapter), PathBuf::from(url)))
            }
        }
    }
}
