use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::provider::Provider;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Connection and sampling settings for the active provider.
///
/// There is exactly one of these per session. The settings screen edits it
/// field by field; nothing here is validated beyond the slider ranges the
/// screen enforces.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub system_prompt: String,
    /// Carried for completeness; requests are always sent non-streaming.
    pub stream_response: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

impl ModelConfig {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            model: String::new(),
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            stream_response: false,
        }
    }

    /// Switch provider. The base URL always snaps back to the provider's default.
    pub fn set_provider(&mut self, provider: Provider) {
        self.provider = provider;
        self.base_url = provider.default_base_url().to_string();
    }

    /// Join `path` onto the base URL with exactly one slash between them.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Startup settings read from `config.json`. Every field is optional; anything
/// missing falls back to the provider defaults. The file is never written.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub system_prompt: Option<String>,
    pub stream_response: Option<bool>,
    pub export_dir: Option<PathBuf>,
    /// Speech synthesis command, e.g. `say` or `espeak -s 170`.
    pub tts_command: Option<String>,
    /// Transcriber command that prints recognized text, one line per phrase.
    pub stt_command: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the default location, or defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::new()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("local-chat").join("config.json"))
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or_default()
    }

    /// Build the session's model settings, layering file values over defaults.
    pub fn model_config(&self) -> ModelConfig {
        let mut config = ModelConfig::for_provider(self.provider());

        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            config.max_tokens = v;
        }
        if let Some(v) = self.top_p {
            config.top_p = v;
        }
        if let Some(v) = self.top_k {
            config.top_k = v;
        }
        if let Some(v) = self.repeat_penalty {
            config.repeat_penalty = v;
        }
        if let Some(prompt) = &self.system_prompt {
            config.system_prompt = prompt.clone();
        }
        if let Some(v) = self.stream_response {
            config.stream_response = v;
        }

        config
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Split a configured command line into program and arguments.
pub fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}
