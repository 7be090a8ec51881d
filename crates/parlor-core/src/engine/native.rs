//! Step-style backend: a GGUF model driven token by token.
//!
//! The native library sits behind [`NativeBackend`] and [`NativeModel`]; this
//! adapter owns the tokenize, evaluate, sample and detokenize loop.

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

/// Entry point into a native inference library.
pub trait NativeBackend: Send + Sync {
    /// Load a single model file.
    fn load_model(&self, path: &Path) -> std::result::Result<Box<dyn NativeModel>, GenerationFault>;
}

/// A loaded model with its evaluation context.
///
/// All calls are blocking and happen on the blocking thread pool.
pub trait NativeModel: Send {
    fn tokenize(&mut self, text: &str) -> std::result::Result<Vec<i32>, GenerationFault>;
    /// Feed tokens into the context.
    fn evaluate(&mut self, tokens: &[i32]) -> std::result::Result<(), GenerationFault>;
    fn sample(&mut self) -> std::result::Result<i32, GenerationFault>;
    fn token_to_piece(&mut self, token: i32) -> std::result::Result<String, GenerationFault>;
    fn eos_token(&self) -> i32;
    /// Drop all context state before a new prompt.
    fn reset(&mut self);
}

type SharedModel = Arc<Mutex<Option<Box<dyn NativeModel>>>>;

/// Adapter for step-style backends.
pub struct NativeAdapter {
    backend: Arc<dyn NativeBackend>,
    model: SharedModel,
    max_new_tokens: usize,
    tokens: TokenSet,
}

impl NativeAdapter {
    pub fn new(backend: Arc<dyn NativeBackend>) -> Self {
        Self {
            backend,
            model: Arc::new(Mutex::new(None)),
            max_new_tokens: GenerationConfig::MAX_NEW_TOKENS,
            tokens: TokenSet::native_default(),
        }
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }
}

#[async_trait]
impl InferenceAdapter for NativeAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    async fn load(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(ParlorError::Load {
                path: path.to_path_buf(),
                message: "model file not found".into(),
            });
        }

        let backend = self.backend.clone();
        let model_path = path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || backend.load_model(&model_path))
            .await
            .map_err(|e| ParlorError::Load {
                path: path.to_path_buf(),
                message: format!("loader task failed: {}", e),
            })?
            .map_err(|fault| ParlorError::Load {
                path: path.to_path_buf(),
                message: fault.to_string(),
            })?;

        *self.model.lock().await = Some(loaded);
        info!("Native model loaded from {}", path.display());
        Ok(())
    }

    fn generate_stream(&self, prompt: String) -> BoxStream<'static, String> {
        let model = self.model.clone();
        let max_new_tokens = self.max_new_tokens;
        let stop = self.tokens.end.clone();

        if model.try_lock().map(|m| m.is_none()).unwrap_or(false) {
            return fault_stream(GenerationFault::new("model is not loaded"));
        }

        blocking_fragments(move |sink| {
            let mut guard = model.blocking_lock();
            let model = guard
                .as_mut()
                .ok_or_else(|| GenerationFault::new("model is not loaded"))?;

            model.reset();
            let input = model.tokenize(&prompt)?;
            model.evaluate(&input)?;
            let eos = model.eos_token();

            let mut produced = 0usize;
            for _ in 0..max_new_tokens {
                let token = model.sample()?;
                if token == eos {
                    break;
                }
                let piece = model.token_to_piece(token)?;
                produced += 1;
                // The stop string is a control marker, never reply text.
                if piece != stop && !sink.emit(piece) {
                    debug!("Consumer went away after {} tokens", produced);
                    return Ok(());
                }
                model.evaluate(&[token])?;
            }
            debug!("Native generation finished after {} tokens", produced);
            Ok(())
        })
    }

    async fn close(&mut self) {
        if self.model.lock().await.take().is_some() {
            info!("Native model released");
        }
    }

    fn tokens(&self) -> TokenSet {
        self.tokens.clone()
    }
}
