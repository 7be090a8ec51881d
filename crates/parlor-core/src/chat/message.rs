//! Chat message model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chat turn.
///
/// Every message carries a stable id so a streaming reply can be updated in
/// place without relying on its position in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    Text { id: Uuid, role: Role, text: String },
    Image { id: Uuid, role: Role, uri: String },
    Audio { id: Uuid, role: Role, uri: String },
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Message::Text {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    pub fn image(role: Role, uri: impl Into<String>) -> Self {
        Message::Image {
            id: Uuid::new_v4(),
            role,
            uri: uri.into(),
        }
    }

    pub fn audio(role: Role, uri: impl Into<String>) -> Self {
        Message::Audio {
            id: Uuid::new_v4(),
            role,
            uri: uri.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Message::Text { id, .. } | Message::Image { id, .. } | Message::Audio { id, .. } => *id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::Text { role, .. }
            | Message::Image { role, .. }
            | Message::Audio { role, .. } => *role,
        }
    }

    /// Text content, for text messages only.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Whether this message should start a generation when it is sent.
    pub fn triggers_reply(&self) -> bool {
        matches!(self, Message::Text { role: Role::User, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Message::user("a").id(), Message::user("a").id());
    }

    #[test]
    fn test_only_user_text_triggers_reply() {
        assert!(Message::user("hi").triggers_reply());
        assert!(!Message::assistant("hi").triggers_reply());
        assert!(!Message::image(Role::User, "file:///a.jpg").triggers_reply());
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(Message::audio(Role::User, "file:///a.wav")).unwrap();
        assert_eq!(json["kind"], "audio");
        assert_eq!(json["role"], "user");
    }
}
