//! Lifecycle of one loaded backend.

use super::InferenceAdapter;
use crate::chat::TokenSet;
use crate::config::EngineKind;
use crate::{ParlorError, Result};
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Loading,
    Ready,
    Closed,
}

/// Owns one inference adapter.
///
/// Generation is only possible in `Ready`. A closed session cannot be loaded
/// again; build a new one instead.
pub struct EngineSession {
    adapter: Box<dyn InferenceAdapter>,
    state: SessionState,
    model_path: Option<PathBuf>,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("kind", &self.adapter.kind())
            .field("state", &self.state)
            .field("model_path", &self.model_path)
            .finish()
    }
}

impl EngineSession {
    pub fn new(adapter: Box<dyn InferenceAdapter>) -> Self {
        Self {
            adapter,
            state: SessionState::Unloaded,
            model_path: None,
        }
    }

    /// Build a session and load it in one step.
    pub async fn open(adapter: Box<dyn InferenceAdapter>, path: &Path) -> Result<Self> {
        let mut session = Self::new(adapter);
        session.load(path).await?;
        Ok(session)
    }

    pub fn kind(&self) -> EngineKind {
        self.adapter.kind()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Load the backend from `path`.
    ///
    /// Every failure is reported as `ParlorError::Load`, and the session
    /// returns to `Unloaded`.
    pub async fn load(&mut self, path: &Path) -> Result<()> {
        match self.state {
            SessionState::Unloaded => {}
            SessionState::Ready if self.model_path.as_deref() == Some(path) => return Ok(()),
            state => {
                return Err(ParlorError::Load {
                    path: path.to_path_buf(),
                    message: format!("session is {:?}", state),
                })
            }
        }

        info!("Loading {} engine from {}", self.kind(), path.display());
        self.state = SessionState::Loading;

        match self.adapter.load(path).await {
            Ok(()) => {
                self.state = SessionState::Ready;
                self.model_path = Some(path.to_path_buf());
                info!("{} engine ready", self.kind());
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Unloaded;
                warn!("Failed to load {} engine: {}", self.kind(), e);
                Err(match e {
                    ParlorError::Load { .. } => e,
                    other => ParlorError::Load {
                        path: path.to_path_buf(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    pub fn tokens(&self) -> TokenSet {
        self.adapter.tokens()
    }

    /// Open a fragment stream for `prompt`.
    pub fn generate(&self, prompt: String) -> Result<BoxStream<'static, String>> {
        if !self.is_ready() {
            return Err(ParlorError::NoActiveEngine);
        }
        debug!("Generating with {} ({} prompt bytes)", self.kind(), prompt.len());
        Ok(self.adapter.generate_stream(prompt))
    }

    /// Release the backend. Idempotent.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.adapter.close().await;
        self.state = SessionState::Closed;
        info!("{} engine closed", self.kind());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chat::TokenSet;
    use async_trait::async_trait;
    use futures::stream;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Adapter that replays fixed fragments.
    pub(crate) struct ScriptedAdapter {
        pub fragments: Vec<String>,
        pub fail_load: bool,
        pub closes: Arc<AtomicUsize>,
    }

    impl ScriptedAdapter {
        pub fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|s| s.to_string()).collect(),
                fail_load: false,
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl InferenceAdapter for ScriptedAdapter {
        fn kind(&self) -> EngineKind {
            EngineKind::Onnx
        }

        async fn load(&mut self, _path: &Path) -> Result<()> {
            if self.fail_load {
                return Err(ParlorError::Config {
                    message: "missing genai_config.json".into(),
                });
            }
            Ok(())
        }

        fn generate_stream(&self, _prompt: String) -> BoxStream<'static, String> {
            stream::iter(self.fragments.clone()).boxed()
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn tokens(&self) -> TokenSet {
            TokenSet::onnx_default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let adapter = ScriptedAdapter::new(&["hi"]);
        let closes = adapter.closes.clone();
        let mut session = EngineSession::new(Box::new(adapter));
        assert_eq!(session.state(), SessionState::Unloaded);
        assert!(matches!(
            session.generate("p".into()),
            Err(ParlorError::NoActiveEngine)
        ));

        session.load(Path::new("/models/m")).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        let fragments: Vec<_> = session.generate("p".into()).unwrap().collect().await;
        assert_eq!(fragments, vec!["hi"]);

        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(session.load(Path::new("/models/m")).await.is_err());
    }

    #[tokio::test]
    async fn test_load_failure_is_load_error() {
        let mut adapter = ScriptedAdapter::new(&[]);
        adapter.fail_load = true;

        let err = EngineSession::open(Box::new(adapter), Path::new("/models/m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::Load { .. }));
    }
}
