//! Conversation methods for Assistant.

use crate::chat::{GenerationPhase, Message};
use crate::error::{ParlorError, Result};
use crate::Assistant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

impl Assistant {
    /// Queue a message. User text also queues a reply.
    ///
    /// Messages are handled strictly in order; a message sent while a reply
    /// is streaming waits for that reply to finish.
    pub fn send_message(&self, message: Message) -> Result<()> {
        self.state.pending.send_modify(|n| *n += 1);
        if self.state.queue.send(message).is_err() {
            self.state.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(ParlorError::Generation {
                message: "chat worker has stopped".into(),
            });
        }
        debug!("Message queued");
        Ok(())
    }

    /// Shorthand for sending user text.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_message(Message::user(text))
    }

    /// Wait until every queued message has been handled.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.pending.subscribe();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// Clear the conversation and stop the reply in flight.
    ///
    /// Downloads are not affected.
    pub async fn reset_chat(&self) {
        let current = self.state.current_cancel.lock().await;
        current.cancel();
        self.state.conversation.clear();
        drop(current);
        info!("Chat reset");
    }

    /// Snapshot of the conversation, newest first.
    pub fn conversation(&self) -> Vec<Message> {
        self.state.conversation.snapshot()
    }

    pub fn subscribe_conversation(&self) -> watch::Receiver<Vec<Message>> {
        self.state.conversation.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<GenerationPhase> {
        self.state.orchestrator.subscribe_phase()
    }

    pub async fn system_prompt(&self) -> String {
        self.state.system_prompt.read().await.clone()
    }

    /// Change the system prompt for future replies and persist it.
    pub async fn set_system_prompt(&self, prompt: impl Into<String>) -> Result<()> {
        let prompt = prompt.into();
        let saved = prompt.clone();
        self.state.settings.update(move |s| s.system_prompt = saved)?;
        *self.state.system_prompt.write().await = prompt;
        Ok(())
    }

    /// Stop any reply in flight and release the active engine.
    pub async fn shutdown(&self) {
        let current = self.state.current_cancel.lock().await;
        current.cancel();
        let mut slot = self.state.engine.lock().await;
        drop(current);
        if let Some(mut session) = slot.take() {
            session.close().await;
        }
        self.state.active_engine.send_replace(None);
        if *self.state.pending.borrow() > 0 {
            warn!("Shutting down with unanswered messages");
        }
    }
}
