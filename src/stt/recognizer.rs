//! Speech recognizer combining VAD and Whisper STT.
//!
//! Silero VAD segments the microphone stream into utterances; Whisper
//! transcribes each completed segment. Every non-empty segment yields exactly
//! one [`RecognitionEvent`], in completion order.

use std::time::Instant;

use anyhow::Result;
use parking_lot::Mutex;
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use sherpa_rs::whisper::{WhisperConfig, WhisperRecognizer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::event::RecognitionEvent;
use crate::config::AppConfig;

/// Recognition language for the Whisper model.
///
/// Hard-selected: the parent process expects dictation in one language and
/// the model language is pinned with it. Not exposed as configuration.
const RECOGNITION_LANGUAGE: &str = "en";

/// Minimum speech duration in seconds to be considered valid.
const MIN_SPEECH_DURATION: f32 = 0.1;

/// Maximum speech duration in seconds (prevent runaway segments).
const MAX_SPEECH_DURATION: f32 = 30.0;

/// VAD window size in samples (512 samples = 32ms at 16kHz).
const VAD_WINDOW_SIZE: i32 = 512;

/// Buffer size in seconds for VAD (how much audio to accumulate).
const VAD_BUFFER_SIZE_SECONDS: f32 = 60.0;

/// State for VAD that needs to be accessed from the audio callback.
/// Separated from Whisper to avoid lock contention (VAD is fast, Whisper is slow).
struct VadState {
    vad: SileroVad,                // Voice activity detector
    was_speaking: bool,            // Previous speaking state for edge detection
    speech_start: Option<Instant>, // Timestamp when speech started
}

/// The engine handle: Silero VAD plus a Whisper recognizer.
///
/// Whisper is open-vocabulary, which is the dictation mode this bridge needs;
/// no constrained grammar exists and none can be attached later. Separate
/// mutexes for VAD (fast) and Whisper (slow) keep the audio path glitch-free.
/// The handle is released by `Drop` on every exit path.
pub struct Recognizer {
    vad_state: Mutex<VadState>,         // VAD state (fast access, <10ms)
    whisper: Mutex<WhisperRecognizer>,  // Whisper recognizer (slow, 100-500ms)
    segment_tx: mpsc::Sender<Vec<f32>>, // Channel for completed speech segments
    sample_rate: u32,                   // Audio sample rate (16kHz)
}

impl Recognizer {
    /// Create a new speech recognizer with event-driven segment delivery.
    ///
    /// # Arguments
    /// * `config` - Application configuration
    ///
    /// # Returns
    /// A tuple of (Recognizer, segment receiver channel)
    ///
    /// # Errors
    /// Returns an error if:
    /// - Failed to initialize Silero VAD
    /// - Failed to initialize the Whisper recognizer for the pinned language
    /// - Model files are missing or invalid
    pub fn new(config: &AppConfig) -> Result<(Self, mpsc::Receiver<Vec<f32>>)> {
        let sample_rate = config.sample_rate;
        let provider = config.effective_provider();

        info!("Initializing speech recognizer with {} provider", provider);

        let vad_config = SileroVadConfig {
            model: config.vad_model_path().to_string_lossy().to_string(),
            threshold: config.vad_threshold,
            sample_rate,
            min_silence_duration: config.vad_silence_duration,
            min_speech_duration: MIN_SPEECH_DURATION,
            max_speech_duration: MAX_SPEECH_DURATION,
            window_size: VAD_WINDOW_SIZE,
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(config.vad_threads.try_into().unwrap_or(1)),
            debug: config.verbose,
        };

        let vad = SileroVad::new(vad_config, VAD_BUFFER_SIZE_SECONDS).map_err(|e| anyhow::anyhow!("Failed to initialize Silero VAD: {}", e))?;

        info!("VAD initialized successfully");

        let encoder_path = config.whisper_encoder_path().to_string_lossy().to_string();
        let decoder_path = config.whisper_decoder_path().to_string_lossy().to_string();
        let tokens_path = config.whisper_tokens_path().to_string_lossy().to_string();

        debug!("Whisper encoder path: {}", encoder_path);
        debug!("Whisper decoder path: {}", decoder_path);
        debug!("Whisper tokens path: {}", tokens_path);

        info!("Recognition language: {}", RECOGNITION_LANGUAGE);

        let whisper_config = WhisperConfig {
            encoder: encoder_path,
            decoder: decoder_path,
            tokens: tokens_path,
            language: RECOGNITION_LANGUAGE.to_string(),
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(config.stt_threads.try_into().unwrap_or(2)),
            debug: config.verbose,
            ..Default::default()
        };

        let whisper = WhisperRecognizer::new(whisper_config).map_err(|e| anyhow::anyhow!("Failed to initialize Whisper: {}", e))?;

        info!("Whisper recognizer initialized successfully");

        // Buffered so a burst of short utterances does not stall the VAD
        let (segment_tx, segment_rx) = mpsc::channel(5);

        let recognizer = Self {
            vad_state: Mutex::new(VadState { vad, was_speaking: false, speech_start: None }),
            whisper: Mutex::new(whisper),
            segment_tx,
            sample_rate,
        };

        Ok((recognizer, segment_rx))
    }

    /// Feed audio samples to VAD and push completed segments immediately.
    ///
    /// Event-driven: a segment is delivered the moment the VAD closes it, so
    /// the engine hands the bridge at most one utterance at a time and never
    /// batches. Thread-safe: called from the capture callback thread while
    /// transcription runs elsewhere.
    pub fn accept_waveform(&self, samples: &[f32]) {
        let mut state = self.vad_state.lock();
        state.vad.accept_waveform(samples.to_vec());

        // Speech state transitions, for the operator log only
        let is_speech = state.vad.is_speech();
        if is_speech && !state.was_speaking {
            state.speech_start = Some(Instant::now());
            info!("Speech started");
        } else if !is_speech
            && state.was_speaking
            && let Some(start) = state.speech_start.take()
        {
            info!("Speech ended ({:.1}s)", start.elapsed().as_secs_f32());
        }
        state.was_speaking = is_speech;

        if !state.vad.is_empty() {
            let segment = state.vad.front();
            state.vad.pop();

            if !segment.samples.is_empty() {
                debug!("Segment completed: {} samples", segment.samples.len());

                // Clone samples before dropping lock
                let samples_to_send = segment.samples.clone();
                drop(state); // Release VAD lock ASAP

                // Non-blocking send (try_send to avoid blocking the audio path)
                if let Err(e) = self.segment_tx.try_send(samples_to_send) {
                    warn!("Failed to send segment (channel full): {}", e);
                }
            }
        }
    }

    /// Transcribe one completed utterance and classify the outcome.
    ///
    /// The transcript is kept exactly as the engine produced it; trimming only
    /// informs the classification, never the emitted text.
    pub fn transcribe_segment(&self, samples: &[f32]) -> RecognitionEvent {
        debug!("Transcribing {} samples", samples.len());

        let mut whisper = self.whisper.lock();
        let result = whisper.transcribe(self.sample_rate, samples);
        drop(whisper); // Release lock as soon as transcription is done

        classify_transcript(result.text)
    }
}

/// Classify an engine transcript into a recognition outcome.
///
/// Whisper has no separate rejection notification; a completed utterance
/// whose transcript holds no usable text is the rejection case.
fn classify_transcript(text: String) -> RecognitionEvent {
    if text.trim().is_empty() {
        debug!("Utterance rejected (no usable transcript)");
        RecognitionEvent::Rejected
    } else {
        info!("Recognized: {}", text.trim());
        RecognitionEvent::Recognized(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_kept_verbatim() {
        let event = classify_transcript(" hello world ".to_string());
        assert_eq!(event, RecognitionEvent::Recognized(" hello world ".to_string()));
    }

    #[test]
    fn test_empty_transcript_is_rejected() {
        assert_eq!(classify_transcript(String::new()), RecognitionEvent::Rejected);
    }

    #[test]
    fn test_whitespace_transcript_is_rejected() {
        assert_eq!(classify_transcript("   \t".to_string()), RecognitionEvent::Rejected);
    }
}
