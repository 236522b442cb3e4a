//! The in-memory conversation log.
//!
//! Messages are only ever appended; the log is cleared as a whole. Nothing
//! here outlives the process.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Who produced a message. `System` is reserved for surfacing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single chat entry. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    timestamp: DateTime<Local>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_timestamp(role, content, Local::now())
    }

    pub fn with_timestamp(role: Role, content: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Blank lines inside the content are dropped; a blank line only ever
    /// separates entries.
    fn export_line(&self) -> String {
        let content = self
            .content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "[{}] {}: {}",
            self.timestamp.format(EXPORT_TIMESTAMP_FORMAT),
            self.role.as_str().to_uppercase(),
            content
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::user(content))
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::assistant(content))
    }

    pub fn push_system(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::system(content))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Plain-text transcript: `[timestamp] ROLE: content`, one blank line between entries.
    pub fn export_text(&self) -> String {
        self.messages
            .iter()
            .map(Message::export_line)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Write the transcript to `chat-<epoch-ms>.txt` inside `dir`.
    pub fn export_to_dir(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(export_file_name(Local::now()));
        fs::write(&path, self.export_text())?;
        Ok(path)
    }
}

pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("chat-{}.txt", at.timestamp_millis())
}
