//! Conversation state, prompt rendering and streamed replies.

pub mod conversation;
pub mod message;
pub mod orchestrator;
pub mod reply;
pub mod template;

pub use conversation::ConversationStore;
pub use message::{Message, Role};
pub use orchestrator::{GenerationOutcome, GenerationPhase, StreamOrchestrator};
pub use reply::extract_reply;
pub use template::{render, TokenSet};
