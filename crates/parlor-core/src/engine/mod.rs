//! Inference backends behind a single capability trait.
//!
//! An `EngineSession` owns exactly one adapter and tracks its lifecycle. The
//! orchestrator only ever talks to a session, never to a concrete backend.

pub mod native;
pub mod onnx;
pub mod server;
pub mod session;

pub use native::{NativeAdapter, NativeBackend, NativeModel};
pub use onnx::{GeneratorBackend, GeneratorModel, OnnxAdapter};
pub use server::ServerAdapter;
pub use session::{EngineSession, SessionState};

use crate::chat::TokenSet;
use crate::config::{EngineKind, GenerationConfig};
use crate::error::GenerationFault;
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::warn;

/// Capabilities every inference backend provides.
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Prepare the backend from a model directory or model file.
    async fn load(&mut self, path: &Path) -> Result<()>;

    /// Stream decoded text for `prompt` until the backend stops.
    ///
    /// Mid-stream faults arrive as a final fragment starting with
    /// [`GenerationConfig::ERROR_MARKER_PREFIX`]. Dropping the stream stops
    /// the backend.
    fn generate_stream(&self, prompt: String) -> BoxStream<'static, String>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&mut self);

    /// Delimiters prompts for this backend are rendered with.
    fn tokens(&self) -> TokenSet;
}

/// The visible fragment a backend fault turns into.
pub fn error_fragment(fault: &GenerationFault) -> String {
    format!("{}{}", GenerationConfig::ERROR_MARKER_PREFIX, fault)
}

/// Producer side of a fragment channel fed from a blocking thread.
pub struct FragmentSink {
    tx: mpsc::Sender<String>,
}

impl FragmentSink {
    /// Hand one fragment to the consumer. Returns `false` once the consumer
    /// has gone away, which the producer treats as a stop request.
    pub fn emit(&self, fragment: String) -> bool {
        self.tx.blocking_send(fragment).is_ok()
    }
}

/// Run a blocking token loop on the blocking pool and stream its fragments.
///
/// A fault returned by `produce` is delivered as an error fragment.
pub(crate) fn blocking_fragments<F>(produce: F) -> BoxStream<'static, String>
where
    F: FnOnce(&FragmentSink) -> std::result::Result<(), GenerationFault> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(GenerationConfig::FRAGMENT_CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let sink = FragmentSink { tx };
        if let Err(fault) = produce(&sink) {
            warn!("Generation fault: {}", fault);
            let _ = sink.emit(error_fragment(&fault));
        }
    });

    stream::unfold(rx, |mut rx| async move {
        let fragment = rx.recv().await?;
        Some((fragment, rx))
    })
    .boxed()
}

/// A one-fragment stream carrying an error marker.
pub(crate) fn fault_stream(fault: GenerationFault) -> BoxStream<'static, String> {
    stream::iter([error_fragment(&fault)]).boxed()
}
