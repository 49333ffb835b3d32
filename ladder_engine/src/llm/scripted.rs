use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChatRequest, ChatResponse, LlmProvider};
use crate::errors::LlmError;

/// Network-free provider double for tests and the S1-S6 seed scenarios
/// (§8): returns canned responses in call order. Panics (via `expect`) if
/// exhausted, since a test that runs out of scripted turns has a bug in
/// its script, not in the engine.
pub struct ScriptedProvider {
    responses: Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let content = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Transport("scripted provider exhausted".to_string()))?;
        Ok(ChatResponse { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ResponseFormatStrategy};

    #[tokio::test]
    async fn replays_in_order() {
        let provider = ScriptedProvider::new(["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: "test".to_string(),
            temperature: 0.0,
            schema_hint: None,
            strategy: ResponseFormatStrategy::JsonObject,
        };
        let first = provider.complete(request.clone()).await.unwrap();
        assert_eq!(first.content, "{\"a\":1}");
        let second = provider.complete(request).await.unwrap();
        assert_eq!(second.content, "{\"b\":2}");
    }
}
