//! Speech capabilities.
//!
//! Both directions sit behind small traits so the chat works the same when
//! no engine is installed:
//! - input: a recognizer that streams transcripts into the draft
//! - output: a synthesizer that reads assistant replies aloud

pub mod input;
pub mod output;

pub use input::{
    CommandRecognizer, RecognitionEvent, RecognitionSink, RecognitionUpdate, RecognitionUpdates,
    SpeechInput, SpeechRecognizer, UnavailableRecognizer,
};
pub use output::{normalize_for_speech, CommandSynthesizer, SilentSynthesizer, SpeechSynthesizer};
