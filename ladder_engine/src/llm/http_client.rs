use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

use super::{ChatRequest, ChatResponse, LlmProvider, ResponseFormatStrategy};
use crate::errors::LlmError;

/// OpenAI-compatible chat-completions adapter (§6, §9). Folds
/// `schema_hint` into the request according to the detected
/// [`ResponseFormatStrategy`] rather than assuming every backend speaks the
/// same structured-output dialect.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmClient {
    #[instrument(skip(self, request), fields(model = %request.model), err)]
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": request.model,
            "temperature": request.temperature,
        });

        match (request.strategy, &request.schema_hint) {
            (ResponseFormatStrategy::NativeJsonSchema | ResponseFormatStrategy::JsonObject, Some(_)) => {
                body["response_format"] = json!({ "type": "json_object" });
            }
            (ResponseFormatStrategy::PromptInstructionOnly, Some(hint)) => {
                messages.push(json!({
                    "role": "system",
                    "content": format!("Respond with only JSON matching this shape: {hint}"),
                }));
            }
            _ => {}
        }
        body["messages"] = json!(messages);

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!("http {status}: {text}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::SchemaMismatch("missing choices[0].message.content".to_string()))?
            .to_string();

        Ok(ChatResponse { content })
    }
}
