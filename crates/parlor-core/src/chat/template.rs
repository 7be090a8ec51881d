//! Prompt rendering with backend-specific role delimiters.

use super::message::{Message, Role};
use crate::config::{EngineKind, PathsConfig};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Beginning-of-sequence marker some tokenizer configs declare that must not
/// be written into a prompt by hand.
const IMPLICIT_BOS: &str = "<|endoftext|>";

/// Delimiter tokens for one backend. Any of them may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub begin: String,
    pub user: String,
    pub assistant: String,
    pub system: String,
    pub end: String,
    pub eos: String,
    /// Written after a role delimiter that opens a turn.
    pub role_suffix: String,
    /// Written after each `end`.
    pub turn_suffix: String,
}

impl TokenSet {
    /// Phi-style chat markers used by generator backends.
    pub fn onnx_default() -> Self {
        Self {
            begin: String::new(),
            user: "<|user|>".into(),
            assistant: "<|assistant|>".into(),
            system: "<|system|>".into(),
            end: "<|end|>".into(),
            eos: String::new(),
            role_suffix: "\n".into(),
            turn_suffix: String::new(),
        }
    }

    /// Markers used by step-style GGUF backends; turns end with `<end_of_turn>`.
    pub fn native_default() -> Self {
        Self {
            end: "<end_of_turn>".into(),
            turn_suffix: "\n".into(),
            ..Self::onnx_default()
        }
    }

    /// Default markers for the model family an engine kind runs.
    ///
    /// Completion servers get the generator markers unless told otherwise.
    pub fn for_engine(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Onnx | EngineKind::Server => Self::onnx_default(),
            EngineKind::Native => Self::native_default(),
        }
    }

    /// Delimiters with no separators at all.
    pub fn bare(user: &str, assistant: &str, system: &str, end: &str) -> Self {
        Self {
            begin: String::new(),
            user: user.into(),
            assistant: assistant.into(),
            system: system.into(),
            end: end.into(),
            eos: String::new(),
            role_suffix: String::new(),
            turn_suffix: String::new(),
        }
    }

    /// Fill `begin` and `eos` from a model directory's `tokenizer_config.json`.
    ///
    /// Role markers keep their values from `defaults`. A missing or unreadable
    /// file leaves `defaults` untouched.
    pub fn from_model_dir(dir: &Path, defaults: TokenSet) -> Self {
        let path = dir.join(PathsConfig::TOKENIZER_CONFIG_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No tokenizer config at {}", path.display());
                return defaults;
            }
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return defaults;
            }
        };

        let config: TokenizerConfig = match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                return defaults;
            }
        };

        let mut tokens = defaults;
        let bos = config.bos_token.map(SpecialToken::into_content).unwrap_or_default();
        tokens.begin = if bos == IMPLICIT_BOS { String::new() } else { bos };
        tokens.eos = config.eos_token.map(SpecialToken::into_content).unwrap_or_default();
        debug!(
            "Chat template tokens: bos={:?} eos={:?}",
            tokens.begin, tokens.eos
        );
        tokens
    }

    fn role_token(&self, role: Role) -> &str {
        match role {
            Role::System => &self.system,
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }
}

impl Default for TokenSet {
    fn default() -> Self {
        Self::onnx_default()
    }
}

#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    bos_token: Option<SpecialToken>,
    #[serde(default)]
    eos_token: Option<SpecialToken>,
}

/// Tokenizer configs write special tokens either as a bare string or as an
/// object with a `content` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Plain(String),
    Detailed { content: String },
}

impl SpecialToken {
    fn into_content(self) -> String {
        match self {
            SpecialToken::Plain(s) => s,
            SpecialToken::Detailed { content } => content,
        }
    }
}

/// Render a newest-first conversation into a prompt, oldest turn first.
///
/// Image and audio messages are written as a `[image: <uri>]` or
/// `[audio: <uri>]` turn for their role. The result ends with the assistant
/// delimiter (and `eos`, when set) to cue a reply.
pub fn render(conversation: &[Message], system_prompt: &str, tokens: &TokenSet) -> String {
    let mut prompt = String::new();
    prompt.push_str(&tokens.begin);

    if !system_prompt.trim().is_empty() {
        push_turn(&mut prompt, tokens, Role::System, system_prompt);
    }

    for message in conversation.iter().rev() {
        match message {
            Message::Text { role, text, .. } => push_turn(&mut prompt, tokens, *role, text),
            Message::Image { role, uri, .. } => {
                push_turn(&mut prompt, tokens, *role, &format!("[image: {}]", uri))
            }
            Message::Audio { role, uri, .. } => {
                push_turn(&mut prompt, tokens, *role, &format!("[audio: {}]", uri))
            }
        }
    }

    prompt.push_str(&tokens.assistant);
    prompt.push_str(&tokens.eos);
    prompt
}

fn push_turn(prompt: &mut String, tokens: &TokenSet, role: Role, text: &str) {
    prompt.push_str(tokens.role_token(role));
    prompt.push_str(&tokens.role_suffix);
    prompt.push_str(text);
    prompt.push_str(&tokens.end);
    prompt.push_str(&tokens.turn_suffix);
}
