use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::split_command;
use crate::error::SpeechError;

/// What a recognition session reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Every result so far, interim and final, in order.
    Transcript(Vec<String>),
    /// The engine stopped on its own.
    Ended,
    /// The engine hit an error and stopped.
    Failed(String),
}

/// An event tagged with the listening session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionUpdate {
    pub session: u64,
    pub event: RecognitionEvent,
}

/// Where the UI collects updates from every session.
pub type RecognitionUpdates = UnboundedSender<RecognitionUpdate>;

/// Handed to a recognizer on start; stamps each event with its session.
#[derive(Debug, Clone)]
pub struct RecognitionSink {
    session: u64,
    tx: RecognitionUpdates,
}

impl RecognitionSink {
    pub fn new(session: u64, tx: RecognitionUpdates) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Returns false once the receiving side is gone.
    pub fn send(&self, event: RecognitionEvent) -> bool {
        self.tx
            .send(RecognitionUpdate {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

pub trait SpeechRecognizer: Send {
    fn is_available(&self) -> bool;

    /// Begin a continuous session, delivering events to `sink`.
    fn start(&mut self, sink: RecognitionSink) -> Result<(), SpeechError>;

    fn stop(&mut self);
}

/// Used when no recognition engine is configured.
#[derive(Debug, Default)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _sink: RecognitionSink) -> Result<(), SpeechError> {
        Err(SpeechError::Unavailable("recognition"))
    }

    fn stop(&mut self) {}
}

/// Runs an external transcriber and treats each stdout line as a final result.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    task: Option<JoinHandle<()>>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            task: None,
        }
    }

    pub fn from_command_line(command: &str) -> Option<Self> {
        split_command(command).map(|(program, args)| Self::new(program, args))
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&mut self, sink: RecognitionSink) -> Result<(), SpeechError> {
        self.stop();

        let spawn_error = |reason: String| SpeechError::Spawn {
            command: self.program.clone(),
            reason,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("no stdout".to_string()))?;

        info!(program = %self.program, "recognition started");

        self.task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut segments: Vec<String> = Vec::new();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let segment = if segments.is_empty() {
                            line.to_string()
                        } else {
                            format!(" {}", line)
                        };
                        segments.push(segment);
                        if !sink.send(RecognitionEvent::Transcript(segments.clone())) {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = child.wait().await;
                        sink.send(RecognitionEvent::Ended);
                        break;
                    }
                    Err(e) => {
                        sink.send(RecognitionEvent::Failed(e.to_string()));
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the task drops the child, which kills it.
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(program = %self.program, "recognition stopped");
        }
    }
}

impl Drop for CommandRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Dictation state: idle or listening, and how recognition events land in the draft.
///
/// Every start opens a new session. Updates from any other session are
/// dropped, so a queued `Ended` from a stopped session can't end the
/// current one.
pub struct SpeechInput {
    recognizer: Box<dyn SpeechRecognizer>,
    listening: bool,
    session: u64,
}

impl SpeechInput {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            listening: false,
            session: 0,
        }
    }

    pub fn unavailable() -> Self {
        Self::new(Box::new(UnavailableRecognizer))
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_available()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// The current (or most recent) session number.
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn start(&mut self, updates: RecognitionUpdates) -> Result<(), SpeechError> {
        if self.listening {
            return Ok(());
        }
        self.session += 1;
        self.recognizer
            .start(RecognitionSink::new(self.session, updates))?;
        self.listening = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.listening {
            self.recognizer.stop();
            self.listening = false;
        }
    }

    /// Start if idle, stop if listening. Returns whether we are now listening.
    pub fn toggle(&mut self, updates: RecognitionUpdates) -> Result<bool, SpeechError> {
        if self.listening {
            self.stop();
        } else {
            self.start(updates)?;
        }
        Ok(self.listening)
    }

    /// Apply a recognition event. Returns true if the draft was replaced.
    ///
    /// Transcripts overwrite the draft with the full text so far; ending or
    /// failing leaves whatever is in the draft alone.
    pub fn handle_event(&mut self, update: RecognitionUpdate, draft: &mut String) -> bool {
        if update.session != self.session {
            debug!(
                session = update.session,
                current = self.session,
                "dropping stale recognition event"
            );
            return false;
        }
        match update.event {
            RecognitionEvent::Transcript(segments) => {
                if !self.listening {
                    return false;
                }
                *draft = segments.concat();
                true
            }
            RecognitionEvent::Ended => {
                self.listening = false;
                false
            }
            RecognitionEvent::Failed(e) => {
                warn!(error = %e, "speech recognition error");
                self.listening = false;
                false
            }
        }
    }
}
