//! Backend served over HTTP by a llama.cpp-compatible server.
//!
//! Completions are requested with `stream: true` and arrive as server-sent
//! events, one JSON object per `data:` line.

use super::{error_fragment, InferenceAdapter};
use crate::chat::TokenSet;
use crate::config::{EngineKind, GenerationConfig, NetworkConfig};
use crate::error::GenerationFault;
use crate::network::{api_client, join_url, streaming_client};
use crate::{ParlorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

/// Adapter for a completion server.
#[derive(Debug, Clone)]
pub struct ServerAdapter {
    base_url: String,
    client: Client,
    stream_client: Client,
    tokens: TokenSet,
    max_new_tokens: usize,
}

impl ServerAdapter {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: api_client()?,
            stream_client: streaming_client()?,
            tokens: TokenSet::onnx_default(),
            max_new_tokens: GenerationConfig::MAX_NEW_TOKENS,
        })
    }

    /// Use the chat markers of the model the server runs.
    pub fn with_tokens(mut self, tokens: TokenSet) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InferenceAdapter for ServerAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Server
    }

    /// The server owns its model; `path` is only recorded for diagnostics.
    async fn load(&mut self, path: &Path) -> Result<()> {
        let url = join_url(&self.base_url, "health");
        debug!("Checking completion server at {} (model {})", url, path.display());

        let response = self
            .client
            .get(&url)
            .timeout(NetworkConfig::HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|e| ParlorError::Load {
                path: path.to_path_buf(),
                message: format!("server unreachable at {}: {}", self.base_url, e),
            })?;

        if !response.status().is_success() {
            return Err(ParlorError::Load {
                path: path.to_path_buf(),
                message: format!("server not ready: HTTP {}", response.status()),
            });
        }

        info!("Completion server ready at {}", self.base_url);
        Ok(())
    }

    fn generate_stream(&self, prompt: String) -> BoxStream<'static, String> {
        let url = join_url(&self.base_url, "completion");
        let stop = if self.tokens.end.is_empty() {
            Vec::new()
        } else {
            vec![self.tokens.end.clone()]
        };
        let request = self
            .stream_client
            .post(&url)
            .json(&CompletionRequest {
                prompt,
                stream: true,
                n_predict: self.max_new_tokens,
                stop,
            })
            .send();

        stream::once(request)
            .flat_map(|result| match result {
                Ok(response) if response.status().is_success() => {
                    sse_fragments(response.bytes_stream().boxed())
                }
                Ok(response) => {
                    let fault = GenerationFault::new(format!(
                        "completion server returned HTTP {}",
                        response.status()
                    ));
                    stream::iter([error_fragment(&fault)]).boxed()
                }
                Err(e) => {
                    let fault = GenerationFault::new(e.to_string());
                    stream::iter([error_fragment(&fault)]).boxed()
                }
            })
            .boxed()
    }

    async fn close(&mut self) {
        debug!("Detached from completion server at {}", self.base_url);
    }

    fn tokens(&self) -> TokenSet {
        self.tokens.clone()
    }
}

/// Parser state for a server-sent event body.
struct SseReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    /// Bytes of an incomplete line.
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl SseReader {
    fn drain_lines(&mut self) {
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']));
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        match serde_json::from_str::<CompletionChunk>(data) {
            Ok(chunk) => {
                if !chunk.content.is_empty() {
                    self.pending.push_back(chunk.content);
                }
                if chunk.stop {
                    self.done = true;
                }
            }
            Err(e) => {
                warn!("Malformed completion event: {}", e);
                let fault = GenerationFault::new(format!("malformed server event: {}", e));
                self.pending.push_back(error_fragment(&fault));
                self.done = true;
            }
        }
    }
}

fn sse_fragments(body: BoxStream<'static, reqwest::Result<Bytes>>) -> BoxStream<'static, String> {
    let reader = SseReader {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(fragment) = reader.pending.pop_front() {
                return Some((fragment, reader));
            }
            if reader.done {
                return None;
            }
            match reader.body.next().await {
                Some(Ok(chunk)) => {
                    reader.buffer.extend_from_slice(&chunk);
                    reader.drain_lines();
                }
                Some(Err(e)) => {
                    let fault = GenerationFault::new(format!("stream interrupted: {}", e));
                    reader.pending.push_back(error_fragment(&fault));
                    reader.done = true;
                }
                None => {
                    reader.buffer.push(b'\n');
                    reader.drain_lines();
                    reader.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&'static str]) -> BoxStream<'static, reqwest::Result<Bytes>> {
        let chunks: Vec<reqwest::Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn test_parses_events_across_chunk_boundaries() {
        let fragments: Vec<String> = sse_fragments(body(&[
            "data: {\"content\":\"Hel\",\"stop\":false}\n\nda",
            "ta: {\"content\":\"lo\",\"stop\":false}\r\n\r\n",
            "data: {\"content\":\"\",\"stop\":true}\n\n",
            "data: {\"content\":\"ignored\",\"stop\":false}\n\n",
        ]))
        .collect()
        .await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_read() {
        let fragments: Vec<String> =
            sse_fragments(body(&["data: {\"content\":\"end\"}"])).collect().await;
        assert_eq!(fragments, vec!["end"]);
    }

    #[tokio::test]
    async fn test_malformed_event_becomes_marker() {
        let fragments: Vec<String> =
            sse_fragments(body(&["data: {\"content\":\"ok\"}\n", "data: nope\n"])).collect().await;
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].starts_with(GenerationConfig::ERROR_MARKER_PREFIX));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_load_error() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let mut adapter = ServerAdapter::new("http://127.0.0.1:9").unwrap();
        let err = adapter.load(Path::new("remote")).await.unwrap_err();
        assert!(matches!(err, ParlorError::Load { .. }));
    }
}
