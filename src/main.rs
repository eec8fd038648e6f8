//! Dictation bridge - streams recognized speech to a parent process.
//!
//! Starts a local speech-recognition engine (Silero VAD + Whisper via
//! sherpa-onnx), listens continuously on the default microphone, and prints
//! each recognized utterance to stdout as one line. A separate parent process
//! consumes those lines; diagnostics are prefixed with `#` so it can tell
//! them apart from dictated text. stdout belongs to the parent, so all
//! logging goes to stderr.

mod audio;
mod bridge;
mod config;
mod error;
mod stt;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use audio::Capturer;
use bridge::{TranscriptSink, forward_events};
use config::AppConfig;
use error::BridgeError;
use stt::{RecognitionEvent, Recognizer};

/// Spawn the transcription task.
///
/// Receives completed utterance segments from the VAD, transcribes each one,
/// and sends the resulting recognition event onward. Segments are processed
/// one at a time in completion order, so events leave this task in the order
/// utterances finished.
fn spawn_transcription_task(
    event_tx: mpsc::Sender<RecognitionEvent>,
    mut segment_rx: mpsc::Receiver<Vec<f32>>,
    recognizer: Arc<Recognizer>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !shutdown.load(Ordering::Relaxed) {
            // Use a timeout to allow shutdown checks
            match tokio::time::timeout(tokio::time::Duration::from_millis(100), segment_rx.recv()).await {
                Ok(Some(samples)) => {
                    let event = recognizer.transcribe_segment(&samples);

                    if let Err(e) = event_tx.send(event).await {
                        debug!("Failed to send recognition event: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Segment channel closed");
                    break;
                }
                Err(_) => {
                    // Timeout - continue to check shutdown flag
                    continue;
                }
            }
        }
    })
}

/// Block until the parent asks the bridge to stop.
///
/// The parent's termination signal is a line on stdin (content ignored; EOF
/// counts too). Ctrl+C and SIGTERM are honored as well so an orphaned bridge
/// still dies with its terminal. The stdin read lives on a plain detached
/// thread: if a signal wins the race, runtime shutdown must not wait for a
/// read that will never return.
async fn wait_for_stop(shutdown: Arc<AtomicBool>) {
    let (stdin_tx, stdin_signal) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = stdin_tx.send(());
    });

    tokio::select! {
        _ = stdin_signal => {
            info!("Stop requested on stdin, shutting down...");
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown.store(true, Ordering::SeqCst);
}

/// Construct the engine and capture pipeline, then listen until stopped.
///
/// On return the engine handle and capture threads have been released,
/// whichever way the listening ended.
async fn run(config: &AppConfig) -> Result<(), BridgeError> {
    let (recognizer, segment_rx) = Recognizer::new(config)?;
    let recognizer = Arc::new(recognizer);

    // Capture callback feeds the VAD directly; completed segments arrive on
    // segment_rx the moment an utterance closes
    let recognizer_for_audio = recognizer.clone();
    let mut capturer = Capturer::new(config.sample_rate, move |samples: &[f32]| {
        recognizer_for_audio.accept_waveform(samples);
    })?;

    let (event_tx, event_rx) = mpsc::channel::<RecognitionEvent>(16);
    let shutdown = Arc::new(AtomicBool::new(false));

    let transcription_handle = spawn_transcription_task(event_tx, segment_rx, recognizer.clone(), shutdown.clone());
    let forward_handle = tokio::spawn(forward_events(event_rx, TranscriptSink::stdout(), !config.quiet_rejections));

    // Tell the parent we are live before the first utterance can complete
    TranscriptSink::stdout().listening().context("Failed to write to stdout")?;

    capturer.start()?;
    config.log_config();

    wait_for_stop(shutdown).await;

    // Stop audio first so no new segments are produced, then release our
    // engine handle; the transcription task drops the last clone when it
    // notices the shutdown flag, which closes the event channel
    capturer.shutdown();
    drop(capturer);
    drop(recognizer);

    let graceful_timeout = tokio::time::Duration::from_millis(500);

    tokio::select! {
        _ = transcription_handle => {
            debug!("Transcription task finished gracefully");
        }
        _ = tokio::time::sleep(graceful_timeout) => {
            debug!("Transcription task didn't finish in time");
        }
    }

    tokio::select! {
        _ = forward_handle => {
            debug!("Forward task finished gracefully");
        }
        _ = tokio::time::sleep(graceful_timeout) => {
            debug!("Forward task didn't finish in time");
        }
    }

    info!("Dictation bridge stopped");
    Ok(())
}

/// Report a fatal failure to the parent as a diagnostic line.
///
/// The parent treats line content as authoritative, not exit status, so the
/// process exits normally after reporting. A missing input device gets its
/// own line shape; everything else shares the generic bridge prefix.
fn report_fatal(err: &BridgeError) {
    error!("Fatal: {:#}", err);

    let mut sink = TranscriptSink::stdout();
    let _ = match err {
        BridgeError::DeviceUnavailable => sink.device_unavailable(&err.to_string()),
        other => sink.bridge_error(&format!("{:#}", other)),
    };
}

#[tokio::main]
async fn main() {
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    // stdout is the data channel shared with the parent; log to stderr only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("Dictation bridge v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        report_fatal(&BridgeError::from(e));
        return;
    }

    if let Err(e) = run(&config).await {
        report_fatal(&e);
    }
}
