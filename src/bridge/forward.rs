//! Event forwarding from the engine to the output channel.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::output::TranscriptSink;
use crate::stt::RecognitionEvent;

/// Forward recognition events to the sink until the event channel closes.
///
/// Events are handled strictly in arrival order; each line is flushed before
/// the next event is received. Recognized text is emitted verbatim when it
/// contains anything beyond whitespace and dropped silently otherwise.
/// Rejections produce the fixed diagnostic line unless reporting is disabled,
/// which changes no other behavior.
///
/// A sink write failure means the parent side of stdout is gone, so
/// forwarding stops.
pub async fn forward_events<W: Write>(mut events: mpsc::Receiver<RecognitionEvent>, mut sink: TranscriptSink<W>, report_rejections: bool) {
    while let Some(event) = events.recv().await {
        let written = match event {
            RecognitionEvent::Recognized(text) => {
                if text.trim().is_empty() {
                    debug!("Dropping transcript with no usable text");
                    Ok(())
                } else {
                    sink.transcript(&text)
                }
            }
            RecognitionEvent::Rejected => {
                if report_rejections {
                    sink.rejected()
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = written {
            warn!("Output channel write failed, stopping forwarding: {}", e);
            break;
        }
    }

    debug!("Event channel closed, forwarding finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_forward(events: Vec<RecognitionEvent>, report_rejections: bool) -> String {
        let (tx, rx) = mpsc::channel(16);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let mut buf = Vec::new();
        forward_events(rx, TranscriptSink::new(&mut buf), report_rejections).await;
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_empty_and_whitespace_transcripts_are_dropped() {
        let events = vec![
            RecognitionEvent::Recognized("hello world".to_string()),
            RecognitionEvent::Recognized(String::new()),
            RecognitionEvent::Recognized("  ".to_string()),
            RecognitionEvent::Recognized("testing one two".to_string()),
        ];
        let out = run_forward(events, true).await;
        assert_eq!(out, "hello world\ntesting one two\n");
    }

    #[tokio::test]
    async fn test_transcripts_are_emitted_untrimmed() {
        let events = vec![RecognitionEvent::Recognized("  padded text ".to_string())];
        let out = run_forward(events, true).await;
        assert_eq!(out, "  padded text \n");
    }

    #[tokio::test]
    async fn test_rejections_reported_in_order() {
        let events = vec![
            RecognitionEvent::Recognized("before".to_string()),
            RecognitionEvent::Rejected,
            RecognitionEvent::Recognized("after".to_string()),
        ];
        let out = run_forward(events, true).await;
        assert_eq!(out, "before\n#rejected\nafter\n");
    }

    #[tokio::test]
    async fn test_rejections_suppressed_when_quiet() {
        let events = vec![
            RecognitionEvent::Rejected,
            RecognitionEvent::Recognized("still forwarded".to_string()),
            RecognitionEvent::Rejected,
        ];
        let out = run_forward(events, false).await;
        assert_eq!(out, "still forwarded\n");
    }
}
