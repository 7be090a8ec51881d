//! Centralized configuration for Parlor.
//!
//! Constants for network access, generation limits and on-disk layout, plus
//! the packaged model presets and the engine kinds a session can be built from.

use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const HUB_BASE: &'static str = "https://huggingface.co";
    pub const USER_AGENT: &'static str =
        concat!("parlor/", env!("CARGO_PKG_VERSION"), " (compatible; LocalAssistant)");
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const DEFAULT_REVISION: &'static str = "main";
}

/// Generation defaults shared by the orchestrator and the adapters.
pub struct GenerationConfig;

impl GenerationConfig {
    pub const DEFAULT_SYSTEM_PROMPT: &'static str = "You are a helpful AI assistant.";
    pub const WELCOME_MESSAGE: &'static str = "Welcome! How can I help you today?";
    /// Whole-sequence ceiling (prompt + reply) for generator-style backends.
    pub const MAX_LENGTH: usize = 2048;
    /// Reply ceiling for step-style backends.
    pub const MAX_NEW_TOKENS: usize = 512;
    pub const FRAGMENT_CHANNEL_CAPACITY: usize = 64;
    pub const ERROR_MARKER_PREFIX: &'static str = "Error during generation: ";
    pub const DEFAULT_SERVER_URL: &'static str = "http://127.0.0.1:8080";
}

/// Shared directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = "parlor";
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const SETTINGS_FILENAME: &'static str = "settings.json";
    pub const TOKENIZER_CONFIG_FILENAME: &'static str = "tokenizer_config.json";
}

/// How a preset's files are laid out in the remote repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetLayout {
    /// Every file under a repository subfolder.
    Subfolder(&'static str),
    /// One repository file.
    SingleFile(&'static str),
}

/// Packaged model variants the assistant knows how to acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelPreset {
    #[default]
    Phi4MiniOnnx,
    Gemma3nGguf,
}

impl ModelPreset {
    pub const ALL: [ModelPreset; 2] = [ModelPreset::Phi4MiniOnnx, ModelPreset::Gemma3nGguf];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPreset::Phi4MiniOnnx => "phi4-mini-onnx",
            ModelPreset::Gemma3nGguf => "gemma3n-gguf",
        }
    }

    pub fn repo_id(&self) -> &'static str {
        match self {
            ModelPreset::Phi4MiniOnnx => "microsoft/Phi-4-mini-instruct-onnx",
            ModelPreset::Gemma3nGguf => "unsloth/gemma-3n-E2B-it-GGUF",
        }
    }

    pub fn revision(&self) -> &'static str {
        NetworkConfig::DEFAULT_REVISION
    }

    pub fn layout(&self) -> PresetLayout {
        match self {
            ModelPreset::Phi4MiniOnnx => {
                PresetLayout::Subfolder("cpu_and_mobile/cpu-int4-rtn-block-32-acc-level-4")
            }
            ModelPreset::Gemma3nGguf => PresetLayout::SingleFile("gemma-3n-E2B-it-Q4_0.gguf"),
        }
    }

    /// Name of the local directory holding this preset, under the models dir.
    pub fn local_dir_name(&self) -> &'static str {
        match self {
            ModelPreset::Phi4MiniOnnx => "phi4_mini_instruct_cpu_int4",
            ModelPreset::Gemma3nGguf => "llama",
        }
    }

    /// The engine kind that can run this preset in-process.
    pub fn engine_kind(&self) -> EngineKind {
        match self {
            ModelPreset::Phi4MiniOnnx => EngineKind::Onnx,
            ModelPreset::Gemma3nGguf => EngineKind::Native,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "phi4-mini-onnx" | "phi" => Some(ModelPreset::Phi4MiniOnnx),
            "gemma3n-gguf" | "gemma" => Some(ModelPreset::Gemma3nGguf),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inference backend families an `EngineSession` can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineKind {
    #[default]
    Onnx,
    Native,
    Server,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Onnx => "onnx",
            EngineKind::Native => "native",
            EngineKind::Server => "server",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            // "phi" is the selection name older settings files carry.
            "onnx" | "phi" => Some(EngineKind::Onnx),
            "native" | "llama" => Some(EngineKind::Native),
            "server" => Some(EngineKind::Server),
            _ => None,
        }
    }

    /// The packaged model an in-process engine of this kind runs.
    ///
    /// `Server` engines bring their own model.
    pub fn preset(&self) -> Option<ModelPreset> {
        match self {
            EngineKind::Onnx => Some(ModelPreset::Phi4MiniOnnx),
            EngineKind::Native => Some(ModelPreset::Gemma3nGguf),
            EngineKind::Server => None,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_roundtrip() {
        for preset in ModelPreset::ALL {
            let parsed = ModelPreset::from_str(preset.as_str()).expect("Should parse");
            assert_eq!(preset, parsed);
        }
    }

    #[test]
    fn test_engine_kind_roundtrip() {
        for kind in [EngineKind::Onnx, EngineKind::Native, EngineKind::Server] {
            assert_eq!(EngineKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EngineKind::from_str("phi"), Some(EngineKind::Onnx));
        assert_eq!(EngineKind::from_str("gpu"), None);
    }

    #[test]
    fn test_engine_presets_match() {
        for preset in ModelPreset::ALL {
            assert_eq!(preset.engine_kind().preset(), Some(preset));
        }
        assert_eq!(EngineKind::Server.preset(), None);
    }

    #[test]
    fn test_user_agent_is_descriptive() {
        assert!(NetworkConfig::USER_AGENT.starts_with("parlor/"));
        assert!(NetworkConfig::USER_AGENT.contains("LocalAssistant"));
    }
}
