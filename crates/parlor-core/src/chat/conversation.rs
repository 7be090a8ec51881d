//! Conversation state shared between the UI and the orchestrator.
//!
//! Messages are stored newest first. Readers get snapshots or subscribe to a
//! `watch` channel; every mutation goes through `ConversationStore`.

use super::message::{Message, Role};
use crate::config::GenerationConfig;
use tokio::sync::watch;
use uuid::Uuid;

/// Ordered, observable record of chat turns.
///
/// Clones share the same conversation.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    tx: watch::Sender<Vec<Message>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// A conversation opened with the assistant's greeting.
    pub fn with_greeting() -> Self {
        let store = Self::new();
        store.push_front(Message::assistant(GenerationConfig::WELCOME_MESSAGE));
        store
    }

    /// Insert `message` as the newest turn and return its id.
    pub fn push_front(&self, message: Message) -> Uuid {
        let id = message.id();
        self.tx.send_modify(|messages| messages.insert(0, message));
        id
    }

    /// Replace the text of a text message. Returns `false` when no text message
    /// with that id exists any more.
    pub fn set_text(&self, id: Uuid, new_text: &str) -> bool {
        let mut found = false;
        self.tx.send_if_modified(|messages| {
            for message in messages.iter_mut() {
                if let Message::Text { id: mid, text, .. } = message {
                    if *mid == id {
                        found = true;
                        if text == new_text {
                            return false;
                        }
                        text.clear();
                        text.push_str(new_text);
                        return true;
                    }
                }
            }
            false
        });
        found
    }

    pub fn clear(&self) {
        self.tx.send_modify(|messages| messages.clear());
    }

    /// Copy of the conversation, newest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Text of the newest assistant message, if any.
    pub fn latest_reply(&self) -> Option<String> {
        self.tx
            .borrow()
            .iter()
            .find(|m| m.role() == Role::Assistant)
            .and_then(|m| m.as_text().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first() {
        let store = ConversationStore::new();
        store.push_front(Message::user("first"));
        store.push_front(Message::user("second"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].as_text(), Some("second"));
        assert_eq!(snapshot[1].as_text(), Some("first"));
    }

    #[test]
    fn test_set_text_by_id() {
        let store = ConversationStore::new();
        let id = store.push_front(Message::assistant(""));
        store.push_front(Message::user("later"));

        assert!(store.set_text(id, "partial"));
        assert_eq!(store.snapshot()[1].as_text(), Some("partial"));
    }

    #[test]
    fn test_set_text_after_clear_is_rejected() {
        let store = ConversationStore::new();
        let id = store.push_front(Message::assistant(""));
        store.clear();

        assert!(!store.set_text(id, "late fragment"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_greeting() {
        let store = ConversationStore::with_greeting();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.latest_reply().as_deref(),
            Some(GenerationConfig::WELCOME_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let store = ConversationStore::new();
        let mut rx = store.subscribe();
        let id = store.push_front(Message::assistant(""));
        rx.changed().await.unwrap();
        rx.borrow_and_update();

        store.set_text(id, "hello");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow()[0].as_text(), Some("hello"));
    }
}
