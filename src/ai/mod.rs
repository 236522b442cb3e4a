pub mod lmstudio;
pub mod ollama;

pub use lmstudio::LmStudioClient;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::ChatError;

/// The JSON-over-HTTP calls the provider clients need.
///
/// Implementations return `ChatError::Status` for any non-2xx answer so the
/// clients only ever see successful bodies.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, ChatError>;
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ChatError>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Value, ChatError> {
        debug!(url, "GET");
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ChatError> {
        debug!(url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ChatError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ChatError::Status {
            status: status.as_u16(),
            detail: error_detail(&text),
        });
    }
    Ok(response.json::<Value>().await?)
}

/// Pull the human-readable part out of an error body.
///
/// Ollama answers `{"error": "..."}`, OpenAI-compatible servers answer
/// `{"error": {"message": "..."}}`. Anything else is passed through as-is.
pub fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        match value.get("error") {
            Some(Value::String(message)) => return message.clone(),
            Some(error) => {
                if let Some(message) = error.get("message").and_then(Value::as_str) {
                    return message.to_string();
                }
            }
            None => {}
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        Get(String),
        Post(String, Value),
    }

    /// Replays canned answers in order and records every call.
    #[derive(Default)]
    pub struct FakeTransport {
        replies: Mutex<VecDeque<Result<Value, ChatError>>>,
        calls: Mutex<Vec<Recorded>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, reply: Result<Value, ChatError>) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        pub fn push_reply(&self, reply: Result<Value, ChatError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }

        pub fn gets(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Recorded::Get(url) => Some(url),
                    _ => None,
                })
                .collect()
        }

        pub fn posts(&self) -> Vec<(String, Value)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Recorded::Post(url, body) => Some((url, body)),
                    _ => None,
                })
                .collect()
        }

        fn next(&self) -> Result<Value, ChatError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Transport("connection refused".to_string())))
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn get_json(&self, url: &str) -> Result<Value, ChatError> {
            self.calls.lock().unwrap().push(Recorded::Get(url.to_string()));
            self.next()
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ChatError> {
            self.calls
                .lock()
                .unwrap()
                .push(Recorded::Post(url.to_string(), body.clone()));
            self.next()
        }
    }
}
