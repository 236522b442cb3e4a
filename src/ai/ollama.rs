use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::HttpTransport;
use crate::config::ModelConfig;
use crate::error::ChatError;

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Client for Ollama's native API.
///
/// `generate` sends only the new prompt; the server sees every call as a
/// fresh conversation.
#[derive(Clone)]
pub struct OllamaClient {
    transport: Arc<dyn HttpTransport>,
}

impl OllamaClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn generate(&self, config: &ModelConfig, prompt: &str) -> Result<String, ChatError> {
        let url = config.endpoint("/api/generate");

        let request = OllamaRequest {
            model: &config.model,
            prompt,
            system: &config.system_prompt,
            options: OllamaOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
                top_p: config.top_p,
                top_k: config.top_k,
                repeat_penalty: config.repeat_penalty,
            },
            stream: false,
        };

        let body = self.transport.post_json(&url, &serde_json::to_value(&request)?).await?;
        let ollama_response: OllamaResponse = serde_json::from_value(body)?;
        Ok(ollama_response.response)
    }

    pub async fn list_models(&self, config: &ModelConfig) -> Result<Vec<String>, ChatError> {
        let url = config.endpoint("/api/tags");

        let body = self.transport.get_json(&url).await?;
        let models_response: OllamaModelsResponse = serde_json::from_value(body)?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::FakeTransport;
    use serde_json::json;

    fn config() -> ModelConfig {
        ModelConfig {
            model: "llama2".to_string(),
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_request_shape() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"response": "Hi there", "done": true}))));
        let client = OllamaClient::new(fake.clone());

        let reply = client.generate(&config(), "Hello").await.unwrap();
        assert_eq!(reply, "Hi there");

        let posts = fake.posts();
        assert_eq!(posts.len(), 1);
        let (url, body) = &posts[0];
        assert_eq!(url, "http://localhost:11434/api/generate");
        assert_eq!(
            body,
            &json!({
                "model": "llama2",
                "prompt": "Hello",
                "system": "You are a helpful assistant.",
                "options": {
                    "temperature": 0.7f32,
                    "num_predict": 2048,
                    "top_p": 0.9f32,
                    "top_k": 40,
                    "repeat_penalty": 1.1f32,
                },
                "stream": false,
            })
        );
    }

    #[tokio::test]
    async fn test_generate_missing_response_is_malformed() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"done": true}))));
        let client = OllamaClient::new(fake);

        let err = client.generate(&config(), "Hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_list_models() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({
            "models": [{"name": "llama2:latest", "size": 1}, {"name": "mistral:7b"}]
        }))));
        let client = OllamaClient::new(fake.clone());

        let models = client.list_models(&config()).await.unwrap();
        assert_eq!(models, vec!["llama2:latest", "mistral:7b"]);
        assert_eq!(fake.gets(), vec!["http://localhost:11434/api/tags"]);
    }
}
