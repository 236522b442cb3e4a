//! Error types for the chat library.

use thiserror::Error;

/// Failures talking to a model server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// Connection refused, DNS failure, timeout, etc.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The body was not the envelope we expected.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChatError::Malformed(e.to_string())
        } else {
            ChatError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Malformed(e.to_string())
    }
}

/// Speech capability errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("speech {0} is not available")]
    Unavailable(&'static str),

    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
