//! Chat with a locally hosted Ollama or LM Studio server.
//!
//! The library holds everything that isn't terminal UI: provider clients,
//! the conversation log, the model directory, speech capabilities and the
//! session that sequences them.

pub mod adapter;
pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod provider;
pub mod session;
pub mod speech;

// Re-export main types for convenience
pub use adapter::{PendingTurn, ProviderAdapter};
pub use ai::{HttpTransport, ReqwestTransport};
pub use config::{Config, ModelConfig};
pub use conversation::{Conversation, Message, Role};
pub use error::{ChatError, ConfigError, SpeechError};
pub use models::{ModelDirectory, RefreshRequest};
pub use provider::Provider;
pub use session::ChatSession;
