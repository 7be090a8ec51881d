//! Drives one generation from prompt to final reply.
//!
//! The orchestrator renders the conversation, inserts an empty assistant
//! placeholder, and rewrites that placeholder after every fragment with the
//! reply extracted from everything received so far.

use super::conversation::ConversationStore;
use super::message::Message;
use super::reply::extract_reply;
use super::template::render;
use crate::cancel::CancellationToken;
use crate::engine::EngineSession;
use crate::Result;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Where the orchestrator is within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    #[default]
    Idle,
    Rendering,
    Streaming,
    Reconciling,
}

/// How a generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The backend finished; the placeholder holds the final reply.
    Completed { placeholder: Uuid, fragments: usize },
    /// Cancelled before or while streaming. The placeholder, if one was
    /// created, keeps whatever text had been committed.
    Cancelled { placeholder: Option<Uuid>, fragments: usize },
    /// The placeholder was removed from the conversation mid-stream.
    Discarded { fragments: usize },
}

/// Runs generations against a conversation, one at a time.
#[derive(Debug)]
pub struct StreamOrchestrator {
    conversation: ConversationStore,
    phase: watch::Sender<GenerationPhase>,
}

impl StreamOrchestrator {
    pub fn new(conversation: ConversationStore) -> Self {
        let (phase, _rx) = watch::channel(GenerationPhase::Idle);
        Self {
            conversation,
            phase,
        }
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn phase(&self) -> GenerationPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<GenerationPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: GenerationPhase) {
        self.phase.send_replace(phase);
    }

    /// Generate a reply to the conversation as it stands.
    ///
    /// Callers serialize runs; the orchestrator itself assumes it is the only
    /// writer of the placeholder it creates.
    pub async fn run(
        &self,
        session: &EngineSession,
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        self.enter(GenerationPhase::Rendering);
        let tokens = session.tokens();
        let prompt = render(&self.conversation.snapshot(), system_prompt, &tokens);

        if cancel.is_cancelled() {
            self.enter(GenerationPhase::Idle);
            return Ok(GenerationOutcome::Cancelled {
                placeholder: None,
                fragments: 0,
            });
        }

        let mut stream = match session.generate(prompt) {
            Ok(stream) => stream,
            Err(e) => {
                self.enter(GenerationPhase::Idle);
                return Err(e);
            }
        };
        let placeholder = self.conversation.push_front(Message::assistant(""));

        self.enter(GenerationPhase::Streaming);
        info!("Generation started with {} engine", session.kind());

        let mut buffer = String::new();
        let mut fragments = 0usize;
        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break GenerationOutcome::Cancelled {
                        placeholder: Some(placeholder),
                        fragments,
                    };
                }
                next = stream.next() => match next {
                    Some(fragment) => {
                        fragments += 1;
                        buffer.push_str(&fragment);
                        let reply = extract_reply(&buffer, &tokens);
                        if !self.conversation.set_text(placeholder, &reply) {
                            break GenerationOutcome::Discarded { fragments };
                        }
                    }
                    None => break GenerationOutcome::Completed { placeholder, fragments },
                },
            }
        };

        self.enter(GenerationPhase::Reconciling);
        drop(stream);
        match &outcome {
            GenerationOutcome::Completed { fragments, .. } => {
                info!("Generation finished after {} fragments", fragments)
            }
            GenerationOutcome::Cancelled { fragments, .. } => {
                info!("Generation cancelled after {} fragments", fragments)
            }
            GenerationOutcome::Discarded { fragments } => {
                debug!("Placeholder removed after {} fragments", fragments)
            }
        }
        self.enter(GenerationPhase::Idle);
        Ok(outcome)
    }
}
