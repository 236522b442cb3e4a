use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::HttpTransport;
use crate::config::ModelConfig;
use crate::conversation::{Message, Role};
use crate::error::ChatError;

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

/// Client for LM Studio's OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct LmStudioClient {
    transport: Arc<dyn HttpTransport>,
}

impl LmStudioClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Send the system prompt, the whole prior history, then `prompt`.
    pub async fn chat(
        &self,
        config: &ModelConfig,
        history: &[Message],
        prompt: &str,
    ) -> Result<String, ChatError> {
        let url = config.endpoint("/v1/chat/completions");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: Role::System.as_str(),
            content: &config.system_prompt,
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role().as_str(),
            content: m.content(),
        }));
        messages.push(ChatMessage {
            role: Role::User.as_str(),
            content: prompt,
        });

        let request = ChatCompletionRequest {
            model: &config.model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            stream: false,
        };

        let body = self.transport.post_json(&url, &serde_json::to_value(&request)?).await?;
        let response: ChatCompletionResponse = serde_json::from_value(body)?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ChatError::Malformed("response has no choices".to_string()))
    }

    pub async fn list_models(&self, config: &ModelConfig) -> Result<Vec<String>, ChatError> {
        let url = config.endpoint("/v1/models");

        let body = self.transport.get_json(&url).await?;
        let response: ModelsResponse = serde_json::from_value(body)?;
        Ok(response.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::FakeTransport;
    use crate::provider::Provider;
    use serde_json::json;

    fn config() -> ModelConfig {
        let mut config = ModelConfig::for_provider(Provider::LmStudio);
        config.model = "qwen2.5-7b-instruct".to_string();
        config.system_prompt = "Be brief.".to_string();
        config
    }

    #[tokio::test]
    async fn test_chat_sends_full_history() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Paris."}}]
        }))));
        let client = LmStudioClient::new(fake.clone());

        let history = vec![
            Message::user("Hi"),
            Message::assistant("Hello!"),
            Message::system("Error: request failed: timeout"),
        ];
        let reply = client.chat(&config(), &history, "Capital of France?").await.unwrap();
        assert_eq!(reply, "Paris.");

        let (url, body) = fake.posts().remove(0);
        assert_eq!(url, "http://localhost:1234/v1/chat/completions");
        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"},
                {"role": "system", "content": "Error: request failed: timeout"},
                {"role": "user", "content": "Capital of France?"},
            ])
        );
        assert_eq!(body["model"], "qwen2.5-7b-instruct");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], false);
        assert!(body.get("top_k").is_none());
    }

    #[tokio::test]
    async fn test_chat_empty_choices_is_malformed() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"choices": []}))));
        let client = LmStudioClient::new(fake);

        let err = client.chat(&config(), &[], "Hi").await.unwrap_err();
        assert_eq!(err, ChatError::Malformed("response has no choices".to_string()));
    }

    #[tokio::test]
    async fn test_list_models() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({
            "object": "list",
            "data": [{"id": "qwen2.5-7b-instruct", "object": "model"}, {"id": "phi-3"}]
        }))));
        let client = LmStudioClient::new(fake.clone());

        let models = client.list_models(&config()).await.unwrap();
        assert_eq!(models, vec!["qwen2.5-7b-instruct", "phi-3"]);
        assert_eq!(fake.gets(), vec!["http://localhost:1234/v1/models"]);
    }
}
