//! One chat session: settings, the conversation, the model list, and the
//! in-flight flag, sequenced so every entry point keeps them consistent.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapter::{PendingTurn, ProviderAdapter};
use crate::config::ModelConfig;
use crate::conversation::{Conversation, Message, Role};
use crate::error::ChatError;
use crate::models::{ModelDirectory, RefreshRequest};
use crate::provider::Provider;
use crate::speech::{SilentSynthesizer, SpeechSynthesizer};

pub struct ChatSession {
    config: ModelConfig,
    conversation: Conversation,
    directory: ModelDirectory,
    adapter: ProviderAdapter,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    in_flight: bool,
}

impl ChatSession {
    pub fn new(config: ModelConfig, adapter: ProviderAdapter) -> Self {
        Self {
            config,
            conversation: Conversation::new(),
            directory: ModelDirectory::new(),
            adapter,
            synthesizer: Arc::new(SilentSynthesizer),
            in_flight: false,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Direct access for settings edits that don't affect the endpoint
    /// (sampling, prompt, model name).
    pub fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn models(&self) -> &[String] {
        self.directory.models()
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    pub fn synthesizer(&self) -> &Arc<dyn SpeechSynthesizer> {
        &self.synthesizer
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Record the user's message and hand back what the provider call needs.
    ///
    /// Returns `None` for a blank draft or while another turn is pending.
    pub fn begin_turn(&mut self, draft: &str) -> Option<PendingTurn> {
        let utterance = draft.trim();
        if utterance.is_empty() || self.in_flight {
            return None;
        }

        let turn = PendingTurn {
            config: self.config.clone(),
            history: self.conversation.messages().to_vec(),
            utterance: utterance.to_string(),
        };

        self.conversation.push_user(utterance);
        self.in_flight = true;
        debug!(provider = self.config.provider.as_str(), "turn started");
        Some(turn)
    }

    /// Record the reply for the pending turn and read it aloud if it is one.
    pub fn complete_turn(&mut self, reply: Message) -> &Message {
        self.in_flight = false;
        if reply.role() == Role::Assistant {
            self.synthesizer.speak(reply.content());
        }
        self.conversation.push(reply)
    }

    /// Send a draft and wait for the reply.
    pub async fn send(&mut self, draft: &str) -> Option<&Message> {
        let turn = self.begin_turn(draft)?;
        let reply = self.adapter.respond(&turn).await;
        Some(self.complete_turn(reply))
    }

    /// Switch provider. The base URL resets to the provider default and the
    /// returned refresh must be performed.
    pub fn set_provider(&mut self, provider: Provider) -> RefreshRequest {
        self.config.set_provider(provider);
        info!(provider = provider.as_str(), base_url = %self.config.base_url, "provider changed");
        self.request_refresh()
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> RefreshRequest {
        self.config.base_url = base_url.into();
        info!(base_url = %self.config.base_url, "base url changed");
        self.request_refresh()
    }

    /// Ticket a model-list fetch against the current settings.
    pub fn request_refresh(&mut self) -> RefreshRequest {
        RefreshRequest {
            ticket: self.directory.begin_refresh(),
            config: self.config.clone(),
        }
    }

    /// Apply a fetched model list. Stale tickets are ignored.
    ///
    /// When the configured model is blank or not offered by the server, the
    /// first listed model becomes the selection.
    pub fn apply_models(&mut self, ticket: u64, result: Result<Vec<String>, ChatError>) {
        if !self.directory.apply(ticket, result) {
            return;
        }
        let models = self.directory.models();
        if let Some(first) = models.first() {
            if !models.iter().any(|m| *m == self.config.model) {
                self.config.model = first.clone();
            }
        }
    }

    /// Perform `request` inline and apply the result.
    pub async fn run_refresh(&mut self, request: RefreshRequest) {
        let result = self.adapter.list_models(&request.config).await;
        self.apply_models(request.ticket, result);
    }

    pub async fn refresh_models(&mut self) {
        let request = self.request_refresh();
        self.run_refresh(request).await;
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    pub fn clear_conversation(&mut self) {
        self.conversation.clear();
    }

    pub fn export_text(&self) -> String {
        self.conversation.export_text()
    }

    pub fn export_to_dir(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = self.conversation.export_to_dir(dir)?;
        info!(path = %path.display(), messages = self.conversation.len(), "conversation exported");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::FakeTransport;
    use crate::speech::output::testing::RecordingSynthesizer;
    use serde_json::json;

    fn session(fake: &Arc<FakeTransport>) -> ChatSession {
        let mut config = ModelConfig::default();
        config.model = "llama2".to_string();
        ChatSession::new(config, ProviderAdapter::new(fake.clone()))
    }

    #[tokio::test]
    async fn test_n_sends_yield_2n_messages_in_order() {
        let fake = Arc::new(FakeTransport::new());
        for i in 0..5 {
            fake.push_reply(Ok(json!({ "response": format!("reply {}", i) })));
        }
        let mut session = session(&fake);

        for i in 0..5 {
            let reply = session.send(&format!("question {}", i)).await.unwrap();
            assert_eq!(reply.role(), Role::Assistant);
        }

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 10);
        for (i, pair) in messages.chunks(2).enumerate() {
            assert_eq!(pair[0].role(), Role::User);
            assert_eq!(pair[0].content(), format!("question {}", i));
            assert_eq!(pair[1].role(), Role::Assistant);
            assert_eq!(pair[1].content(), format!("reply {}", i));
        }
        assert!(!session.is_in_flight());
    }

    #[tokio::test]
    async fn test_failed_send_appends_one_system_entry() {
        let fake = Arc::new(FakeTransport::new().reply(Err(ChatError::Status {
            status: 500,
            detail: "out of memory".to_string(),
        })));
        let mut session = session(&fake);

        session.send("Hello").await;

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), Role::User);
        assert_eq!(messages[0].content(), "Hello");
        assert_eq!(messages[1].role(), Role::System);
        assert!(messages[1].content().contains("out of memory"));
        assert!(!messages.iter().any(|m| m.role() == Role::Assistant));
        assert!(!session.is_in_flight());
    }

    #[tokio::test]
    async fn test_blank_draft_is_ignored() {
        let fake = Arc::new(FakeTransport::new());
        let mut session = session(&fake);

        assert!(session.send("   \n\t").await.is_none());
        assert!(session.conversation().is_empty());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_draft_is_trimmed() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"response": "Hi there"}))));
        let mut session = session(&fake);

        session.send("  Hello \n").await;
        assert_eq!(session.conversation().messages()[0].content(), "Hello");
        assert_eq!(fake.posts()[0].1["prompt"], "Hello");
    }

    #[test]
    fn test_second_send_while_in_flight_is_rejected() {
        let fake = Arc::new(FakeTransport::new());
        let mut session = session(&fake);

        assert!(session.begin_turn("first").is_some());
        assert!(session.begin_turn("second").is_none());
        assert_eq!(session.conversation().len(), 1);

        session.complete_turn(Message::assistant("done"));
        assert!(session.begin_turn("third").is_some());
    }

    #[test]
    fn test_pending_turn_history_excludes_new_message() {
        let fake = Arc::new(FakeTransport::new());
        let mut session = session(&fake);

        let turn = session.begin_turn("one").unwrap();
        assert!(turn.history.is_empty());
        session.complete_turn(Message::assistant("two"));

        let turn = session.begin_turn("three").unwrap();
        let contents: Vec<&str> = turn.history.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert_eq!(turn.utterance, "three");
    }

    #[tokio::test]
    async fn test_only_assistant_replies_are_spoken() {
        let fake = Arc::new(
            FakeTransport::new()
                .reply(Ok(json!({"response": "Hi there"})))
                .reply(Err(ChatError::Transport("refused".to_string()))),
        );
        let synth = RecordingSynthesizer::default();
        let mut session = session(&fake).with_synthesizer(Arc::new(synth.clone()));

        session.send("Hello").await;
        session.send("Again").await;

        assert_eq!(*synth.spoken.lock().unwrap(), vec!["Hi there".to_string()]);
    }

    #[tokio::test]
    async fn test_switching_provider_resets_url_and_refetches_once() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"data": [{"id": "phi-3"}]}))));
        let mut session = session(&fake);
        session.config_mut().base_url = "http://gpu-box:11434".to_string();

        let request = session.set_provider(Provider::LmStudio);
        assert_eq!(session.config().base_url, "http://localhost:1234");
        session.run_refresh(request).await;

        assert_eq!(fake.gets(), vec!["http://localhost:1234/v1/models"]);
        assert_eq!(session.models(), ["phi-3".to_string()].as_slice());
        assert_eq!(session.config().model, "phi-3");
    }

    #[tokio::test]
    async fn test_base_url_change_refetches_against_new_url() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"models": []}))));
        let mut session = session(&fake);

        let request = session.set_base_url("http://10.0.0.5:11434/");
        session.run_refresh(request).await;

        assert_eq!(fake.gets(), vec!["http://10.0.0.5:11434/api/tags"]);
        assert!(session.models().is_empty());
        assert_eq!(session.config().model, "llama2");
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_models() {
        let fake = Arc::new(
            FakeTransport::new().reply(Ok(json!({"models": [{"name": "llama2"}, {"name": "mistral"}]}))),
        );
        let mut session = session(&fake);

        session.refresh_models().await;
        assert_eq!(session.models().len(), 2);
        assert_eq!(session.config().model, "llama2");

        session.refresh_models().await;
        assert!(session.models().is_empty());
    }

    #[test]
    fn test_stale_refresh_does_not_override() {
        let fake = Arc::new(FakeTransport::new());
        let mut session = session(&fake);

        let first = session.set_provider(Provider::LmStudio);
        let second = session.set_provider(Provider::Ollama);

        session.apply_models(second.ticket, Ok(vec!["llama2".to_string()]));
        session.apply_models(first.ticket, Ok(vec!["phi-3".to_string()]));

        assert_eq!(session.models(), ["llama2".to_string()].as_slice());
    }

    #[tokio::test]
    async fn test_clear_and_export() {
        let fake = Arc::new(FakeTransport::new().reply(Ok(json!({"response": "Hi there"}))));
        let mut session = session(&fake);

        session.send("Hello").await;
        let text = session.export_text();
        assert_eq!(text.split("\n\n").count(), 2);
        assert!(text.contains("USER: Hello"));
        assert!(text.contains("ASSISTANT: Hi there"));

        session.clear_conversation();
        assert!(session.conversation().is_empty());
        assert_eq!(session.export_text(), "");
    }
}
