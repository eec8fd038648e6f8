//! Recognition outcome delivered once per utterance.

/// Outcome of one completed utterance, delivered in completion order.
///
/// `Recognized` carries the transcript exactly as the engine produced it; the
/// text may still be empty or whitespace, in which case the bridge emits
/// nothing for the event. `Rejected` means the engine closed an utterance but
/// could not map the audio to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Recognized(String),
    Rejected,
}
