//! LLM provider collaborator (§6, §9): a narrow "structured chat" interface
//! so provider variance never leaks into C2/C3/C7. Concrete adapters live in
//! [`http_client`]; [`scripted`] is the network-free double used by tests.

mod http_client;
pub mod json_repair;
mod scripted;

pub use http_client::HttpLlmClient;
pub use scripted::ScriptedProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LlmError;

/// One message in a chat-completions request (§6: "a list of `{role,
/// content}` messages").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// How strongly the provider supports structured output, detected by
/// inspecting the base URL host (§6, §9). Adapters degrade through these
/// tiers: native schema → JSON-object mode → prompt-instruction-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormatStrategy {
    NativeJsonSchema,
    JsonObject,
    PromptInstructionOnly,
}

impl ResponseFormatStrategy {
    /// Host-sniffing provider detection (§6, §9). Unknown hosts degrade to
    /// the safest, most widely supported tier.
    #[must_use]
    pub fn detect(base_url: &str) -> Self {
        if base_url.contains("openai.com") {
            ResponseFormatStrategy::NativeJsonSchema
        } else if base_url.contains("localhost") || base_url.contains("127.0.0.1") {
            ResponseFormatStrategy::JsonObject
        } else {
            ResponseFormatStrategy::PromptInstructionOnly
        }
    }
}

/// A structured chat-completions request. `schema_hint` is a human-readable
/// description of the desired JSON shape; adapters fold it into the request
/// according to their [`ResponseFormatStrategy`].
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub schema_hint: Option<String>,
    pub strategy: ResponseFormatStrategy,
}

#[derive(Clone, Debug)]
pub struct ChatResponse {
    pub content: String,
}

/// The only interface C2/C3/C7 depend on. Never `reqwest` directly (§9:
/// "LLM provider variance should not leak into the core").
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Issues a chat request and defensively parses the response as JSON,
/// applying the repair passes from [`json_repair`] (§4.7: "markdown fences
/// stripped, trailing commas repaired, Python-style literals replaced,
/// trailing thinking blocks discarded").
pub async fn chat_json(
    llm: &dyn LlmProvider,
    request: ChatRequest,
) -> Result<serde_json::Value, LlmError> {
    let response = llm.complete(request).await?;
    json_repair::parse_defensively(&response.content)
        .map_err(|e| LlmError::Unparsable(e.to_string()))
}
