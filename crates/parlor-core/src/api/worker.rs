//! The task that turns queued messages into conversation turns and replies.

use super::state::EngineSlot;
use crate::cancel::CancellationToken;
use crate::chat::{ConversationStore, Message, StreamOrchestrator};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, warn};

pub(crate) struct ChatWorker {
    pub conversation: ConversationStore,
    pub orchestrator: Arc<StreamOrchestrator>,
    pub engine: EngineSlot,
    pub current_cancel: Arc<Mutex<CancellationToken>>,
    pub system_prompt: Arc<RwLock<String>>,
    pub pending: Arc<watch::Sender<usize>>,
}

impl ChatWorker {
    /// Handle messages in arrival order until every sender is gone.
    ///
    /// A message joins the conversation when its turn comes, so a message
    /// sent during a generation never lands above that generation's reply.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            self.handle(message).await;
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
        debug!("Chat worker stopped");
    }

    async fn handle(&self, message: Message) {
        // Lock order is cancel guard, then engine slot, as in `activate` and
        // `reset_chat`. Holding the guard until the slot is ours means a
        // switch or reset either lands before this message joins the chat or
        // cancels the token installed for it.
        let mut current = self.current_cancel.lock().await;
        let triggers_reply = message.triggers_reply();
        self.conversation.push_front(message);
        if !triggers_reply {
            return;
        }

        let cancel = CancellationToken::new();
        *current = cancel.clone();
        let system_prompt = self.system_prompt.read().await.clone();

        let slot = self.engine.lock().await;
        drop(current);
        let Some(session) = slot.as_ref().filter(|s| s.is_ready()) else {
            warn!("No inference engine is loaded; message left unanswered");
            return;
        };

        if let Err(e) = self.orchestrator.run(session, &system_prompt, &cancel).await {
            error!("Generation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::tests::ScriptedAdapter;
    use crate::engine::EngineSession;
    use std::path::Path;
    use std::time::Duration;

    struct Harness {
        conversation: ConversationStore,
        engine: EngineSlot,
        current_cancel: Arc<Mutex<CancellationToken>>,
        pending: Arc<watch::Sender<usize>>,
        queue: mpsc::UnboundedSender<Message>,
    }

    impl Harness {
        fn send(&self, message: Message) {
            self.pending.send_modify(|n| *n += 1);
            self.queue.send(message).unwrap();
        }

        async fn idle(&self) {
            let mut rx = self.pending.subscribe();
            rx.wait_for(|n| *n == 0).await.unwrap();
        }
    }

    async fn session(fragments: &[&str]) -> EngineSession {
        EngineSession::open(Box::new(ScriptedAdapter::new(fragments)), Path::new("/models/test"))
            .await
            .unwrap()
    }

    async fn start(fragments: &[&str]) -> Harness {
        let conversation = ConversationStore::new();
        let engine: EngineSlot = Arc::new(Mutex::new(Some(session(fragments).await)));
        let current_cancel = Arc::new(Mutex::new(CancellationToken::new()));
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let (queue, rx) = mpsc::unbounded_channel();

        let worker = ChatWorker {
            conversation: conversation.clone(),
            orchestrator: Arc::new(StreamOrchestrator::new(conversation.clone())),
            engine: engine.clone(),
            current_cancel: current_cancel.clone(),
            system_prompt: Arc::new(RwLock::new(String::new())),
            pending: pending.clone(),
        };
        tokio::spawn(worker.run(rx));

        Harness {
            conversation,
            engine,
            current_cancel,
            pending,
            queue,
        }
    }

    #[tokio::test]
    async fn test_message_is_not_cleared_by_reset_already_running() {
        let harness = start(&["<|assistant|>hello"]).await;

        // Same steps as `reset_chat`, paused while the guard is held.
        let current = harness.current_cancel.lock().await;
        harness.send(Message::user("hi"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.conversation.is_empty());

        current.cancel();
        harness.conversation.clear();
        drop(current);
        harness.idle().await;

        let messages = harness.conversation.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].as_text(), Some("hello"));
        assert_eq!(messages[1].as_text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_message_sent_during_switch_is_answered_by_new_engine() {
        let harness = start(&["<|assistant|>old"]).await;

        // Same steps as `activate`: cancel, take the slot, then let go of the guard.
        let current = harness.current_cancel.lock().await;
        current.cancel();
        harness.send(Message::user("hi"));
        let mut slot = harness.engine.lock().await;
        drop(current);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The worker has taken its turn and waits on the slot.
        assert_eq!(harness.conversation.len(), 1);
        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        *slot = Some(session(&["<|assistant|>new"]).await);
        drop(slot);
        harness.idle().await;

        let messages = harness.conversation.snapshot();
        assert_eq!(messages[0].as_text(), Some("new"));
        assert_eq!(messages[1].as_text(), Some("hi"));
    }
}
