//! Speech-to-text module using sherpa-rs.
//!
//! Provides voice activity detection (VAD) and Whisper-based speech
//! recognition, delivering one recognition outcome per utterance.

mod event;
mod recognizer;

pub use event::RecognitionEvent;
pub use recognizer::Recognizer;
