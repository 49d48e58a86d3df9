//! Type definitions for text-generation interactions

use serde::{Deserialize, Serialize};

/// Chat message in OpenAI-compatible format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Chat completion response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
}

/// Binary attachment kept out of the prompt and committed beside the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    /// Sanitized original name, without the `.b64` suffix
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Output of one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Non-empty page text; not guaranteed to be well-formed HTML
    pub html: String,
    pub binary_files: Vec<BinaryFile>,
}
