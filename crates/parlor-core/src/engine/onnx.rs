//! Generator-style backend: a model directory with a built-in search loop.
//!
//! The runtime decides when the sequence is done; this adapter feeds it the
//! prompt, caps the whole sequence at `MAX_LENGTH` and decodes token by token.

use super::{blocking_fragments, fault_stream, InferenceAdapter};
use crate::chat::TokenSet;
use crate::config::{EngineKind, GenerationConfig};
use crate::error::GenerationFault;
use crate::{ParlorError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Entry point into a generator runtime.
pub trait GeneratorBackend: Send + Sync {
    /// Open the model stored in `model_dir`.
    fn open(&self, model_dir: &Path) -> std::result::Result<Box<dyn GeneratorModel>, GenerationFault>;
}

/// A loaded generator model with its tokenizer.
pub trait GeneratorModel: Send {
    fn encode(&mut self, prompt: &str) -> std::result::Result<Vec<i32>, GenerationFault>;
    /// Start a search over `input` capped at `max_length` tokens in total.
    fn begin(&mut self, input: &[i32], max_length: usize) -> std::result::Result<(), GenerationFault>;
    /// The next generated token, or `None` when the search is done.
    fn next_token(&mut self) -> std::result::Result<Option<i32>, GenerationFault>;
    fn decode(&mut self, token: i32) -> std::result::Result<String, GenerationFault>;
}

/// Adapter for generator-style backends.
pub struct OnnxAdapter {
    backend: Arc<dyn GeneratorBackend>,
    model: Arc<Mutex<Option<Box<dyn GeneratorModel>>>>,
    max_length: usize,
    tokens: TokenSet,
}

impl OnnxAdapter {
    pub fn new(backend: Arc<dyn GeneratorBackend>) -> Self {
        Self {
            backend,
            model: Arc::new(Mutex::new(None)),
            max_length: GenerationConfig::MAX_LENGTH,
            tokens: TokenSet::onnx_default(),
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }
}

#[async_trait]
impl InferenceAdapter for OnnxAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Onnx
    }

    async fn load(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(ParlorError::Load {
                path: path.to_path_buf(),
                message: "model directory not found".into(),
            });
        }

        let backend = self.backend.clone();
        let model_dir = path.to_path_buf();
        let opened = tokio::task::spawn_blocking(move || backend.open(&model_dir))
            .await
            .map_err(|e| ParlorError::Load {
                path: path.to_path_buf(),
                message: format!("loader task failed: {}", e),
            })?
            .map_err(|fault| ParlorError::Load {
                path: path.to_path_buf(),
                message: fault.to_string(),
            })?;

        self.tokens = TokenSet::from_model_dir(path, TokenSet::onnx_default());
        *self.model.lock().await = Some(opened);
        info!("Generator model loaded from {}", path.display());
        Ok(())
    }

    fn generate_stream(&self, prompt: String) -> BoxStream<'static, String> {
        let model = self.model.clone();
        let max_length = self.max_length;

        if model.try_lock().map(|m| m.is_none()).unwrap_or(false) {
            return fault_stream(GenerationFault::new("model is not loaded"));
        }

        blocking_fragments(move |sink| {
            let mut guard = model.blocking_lock();
            let generator = guard
                .as_mut()
                .ok_or_else(|| GenerationFault::new("model is not loaded"))?;

            let input = generator.encode(&prompt)?;
            generator.begin(&input, max_length)?;

            let mut produced = 0usize;
            while let Some(token) = generator.next_token()? {
                produced += 1;
                if !sink.emit(generator.decode(token)?) {
                    break;
                }
            }
            debug!("Generator produced {} tokens", produced);
            Ok(())
        })
    }

    async fn close(&mut self) {
        if self.model.lock().await.take().is_some() {
            info!("Generator model released");
        }
    }

    fn tokens(&self) -> TokenSet {
        self.tokens.clone()
    }
}
