use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, warn};

use crate::config::split_command;

pub trait SpeechSynthesizer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Start speaking and return immediately. Failures are logged, never returned.
    fn speak(&self, text: &str);
}

/// Used when no synthesis engine is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynthesizer;

impl SpeechSynthesizer for SilentSynthesizer {
    fn is_available(&self) -> bool {
        false
    }

    fn speak(&self, _text: &str) {}
}

/// Speaks by running an external program (`say`, `espeak`, `spd-say`, ...)
/// with the text as its last argument.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_command_line(command: &str) -> Option<Self> {
        split_command(command).map(|(program, args)| Self::new(program, args))
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn is_available(&self) -> bool {
        true
    }

    fn speak(&self, text: &str) {
        let text = normalize_for_speech(text);
        if text.is_empty() {
            return;
        }

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug!(program = %self.program, chars = text.len(), "speaking");
                // Reap the child off-thread; nobody waits on the utterance.
                thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!(program = %self.program, error = %e, "speech synthesis failed"),
        }
    }
}

/// Drop markdown decoration that synthesizers would read out literally.
pub fn normalize_for_speech(text: &str) -> String {
    let result: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_' | '>' | '|'))
        .collect();

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
