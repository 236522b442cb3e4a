//! Turns a user utterance into exactly one reply message, whatever the provider.

use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::{HttpTransport, LmStudioClient, OllamaClient, ReqwestTransport};
use crate::config::ModelConfig;
use crate::conversation::Message;
use crate::error::ChatError;
use crate::provider::Provider;

/// Everything a provider call needs, captured when the user hits send.
///
/// `history` is the conversation as it was *before* this turn's user message.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub config: ModelConfig,
    pub history: Vec<Message>,
    pub utterance: String,
}

#[derive(Clone)]
pub struct ProviderAdapter {
    ollama: OllamaClient,
    lmstudio: LmStudioClient,
}

impl Default for ProviderAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::new()))
    }
}

impl ProviderAdapter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            ollama: OllamaClient::new(transport.clone()),
            lmstudio: LmStudioClient::new(transport),
        }
    }

    /// Run one turn. Never fails: errors come back as a `System` message.
    pub async fn respond(&self, turn: &PendingTurn) -> Message {
        match self.request_reply(turn).await {
            Ok(reply) => {
                info!(
                    provider = turn.config.provider.as_str(),
                    model = %turn.config.model,
                    chars = reply.len(),
                    "reply received"
                );
                Message::assistant(reply)
            }
            Err(e) => {
                warn!(provider = turn.config.provider.as_str(), error = %e, "turn failed");
                Message::system(format!("Error: {}", e))
            }
        }
    }

    async fn request_reply(&self, turn: &PendingTurn) -> Result<String, ChatError> {
        match turn.config.provider {
            Provider::Ollama => self.ollama.generate(&turn.config, &turn.utterance).await,
            Provider::LmStudio => {
                self.lmstudio
                    .chat(&turn.config, &turn.history, &turn.utterance)
                    .await
            }
        }
    }

    pub async fn list_models(&self, config: &ModelConfig) -> Result<Vec<String>, ChatError> {
        match config.provider {
            Provider::Ollama => self.ollama.list_models(config).await,
            Provider::LmStudio => self.lmstudio.list_models(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::FakeTransport;
    use crate::conversation::Role;
    use serde_json::json;

    fn turn(provider: Provider, history: Vec<Message>, utterance: &str) -> PendingTurn {
        let mut config = ModelConfig::for_provider(provider);
        config.model = "llama2".to_string();
        PendingTurn {
            config,
            history,
            utterance: utterance.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ollama_hello() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"response": "Hi there"}))));
        let adapter = ProviderAdapter::new(fake.clone());

        let reply = adapter.respond(&turn(Provider::Ollama, vec![], "Hello")).await;
        assert_eq!(reply.role(), Role::Assistant);
        assert_eq!(reply.content(), "Hi there");

        let (url, body) = fake.posts().remove(0);
        assert!(url.ends_with("/api/generate"));
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["model"], "llama2");
    }

    #[tokio::test]
    async fn test_ollama_omits_history() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"response": "ok"}))));
        let adapter = ProviderAdapter::new(fake.clone());

        let history = vec![Message::user("my name is Ada"), Message::assistant("Hi Ada")];
        adapter.respond(&turn(Provider::Ollama, history, "what is my name?")).await;

        let (_, body) = fake.posts().remove(0);
        assert_eq!(body["prompt"], "what is my name?");
        assert!(body.get("messages").is_none());
        assert!(!body.to_string().contains("Ada"));
    }

    #[tokio::test]
    async fn test_lmstudio_includes_history() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({
            "choices": [{"message": {"content": "Your name is Ada."}}]
        }))));
        let adapter = ProviderAdapter::new(fake.clone());

        let history = vec![Message::user("my name is Ada"), Message::assistant("Hi Ada")];
        let reply = adapter
            .respond(&turn(Provider::LmStudio, history, "what is my name?"))
            .await;
        assert_eq!(reply.content(), "Your name is Ada.");

        let (_, body) = fake.posts().remove(0);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["content"], "my name is Ada");
        assert_eq!(messages[3]["content"], "what is my name?");
    }

    #[tokio::test]
    async fn test_status_error_becomes_system_message() {
        let fake = Arc::new(FakeTransport::new().reply(Err(ChatError::Status {
            status: 404,
            detail: "model 'llama2' not found".to_string(),
        })));
        let adapter = ProviderAdapter::new(fake);

        let reply = adapter.respond(&turn(Provider::Ollama, vec![], "Hello")).await;
        assert_eq!(reply.role(), Role::System);
        assert_eq!(
            reply.content(),
            "Error: server returned 404: model 'llama2' not found"
        );
    }

    #[tokio::test]
    async fn test_transport_error_becomes_system_message() {
        let adapter = ProviderAdapter::new(Arc::new(FakeTransport::new()));

        let reply = adapter.respond(&turn(Provider::LmStudio, vec![], "Hello")).await;
        assert_eq!(reply.role(), Role::System);
        assert!(reply.content().starts_with("Error: request failed"));
    }

    #[tokio::test]
    async fn test_malformed_envelope_becomes_system_message() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"choices": "nope"}))));
        let adapter = ProviderAdapter::new(fake);

        let reply = adapter.respond(&turn(Provider::LmStudio, vec![], "Hello")).await;
        assert_eq!(reply.role(), Role::System);
        assert!(reply.content().starts_with("Error: unexpected response"));
    }

    #[tokio::test]
    async fn test_list_models_dispatches_by_provider() {
        let fake = Arc::new(
            FakeTransport::new()
                .reply(Ok(json!({"models": [{"name": "llama2"}]})))
                .reply(Ok(json!({"data": [{"id": "phi-3"}]}))),
        );
        let adapter = ProviderAdapter::new(fake.clone());

        let ollama = adapter
            .list_models(&ModelConfig::for_provider(Provider::Ollama))
            .await
            .unwrap();
        let lmstudio = adapter
            .list_models(&ModelConfig::for_provider(Provider::LmStudio))
            .await
            .unwrap();

        assert_eq!(ollama, vec!["llama2"]);
        assert_eq!(lmstudio, vec!["phi-3"]);
        assert_eq!(
            fake.gets(),
            vec![
                "http://localhost:11434/api/tags",
                "http://localhost:1234/v1/models"
            ]
        );
    }
}
