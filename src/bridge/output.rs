//! Line-oriented output channel shared with the parent process.
//!
//! stdout carries two kinds of lines: recognized transcripts, emitted
//! verbatim, and diagnostics, which always start with `#`. The parent tells
//! them apart by that prefix alone; exit codes carry no meaning. Every line
//! is flushed as soon as it is written so the parent sees each utterance
//! immediately instead of on buffer boundaries.

use std::io::{self, Stdout, Write};

/// Fixed diagnostic emitted once the engine is listening.
pub const LISTENING_LINE: &str = "#listening";

/// Fixed diagnostic emitted for an utterance the engine rejected.
pub const REJECTED_LINE: &str = "#rejected";

/// Append-only, flush-after-write sink for transcript and diagnostic lines.
pub struct TranscriptSink<W: Write> {
    writer: W,
}

impl TranscriptSink<Stdout> {
    /// Sink bound to the process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TranscriptSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Emit one recognized utterance, verbatim.
    pub fn transcript(&mut self, text: &str) -> io::Result<()> {
        self.line(text)
    }

    /// Emit the listening diagnostic (the bridge is live).
    pub fn listening(&mut self) -> io::Result<()> {
        self.line(LISTENING_LINE)
    }

    /// Emit the fixed rejection diagnostic.
    pub fn rejected(&mut self) -> io::Result<()> {
        self.line(REJECTED_LINE)
    }

    /// Emit the fatal diagnostic for a missing audio input device.
    pub fn device_unavailable(&mut self, detail: &str) -> io::Result<()> {
        self.line(&format!("#error device-unavailable: {detail}"))
    }

    /// Emit the fatal diagnostic for any other bridge failure.
    pub fn bridge_error(&mut self, detail: &str) -> io::Result<()> {
        self.line(&format!("#error bridge: {detail}"))
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "{text}")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that records every flush so the per-line flush contract is
    /// observable.
    struct FlushCounter {
        buf: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.write(data)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_transcript_is_verbatim_and_newline_terminated() {
        let mut sink = TranscriptSink::new(Vec::new());
        sink.transcript("  hello world  ").unwrap();
        assert_eq!(sink.writer, b"  hello world  \n");
    }

    #[test]
    fn test_every_line_is_flushed() {
        let mut sink = TranscriptSink::new(FlushCounter { buf: Vec::new(), flushes: 0 });
        sink.transcript("one").unwrap();
        sink.rejected().unwrap();
        sink.transcript("two").unwrap();
        assert_eq!(sink.writer.flushes, 3);
        assert_eq!(sink.writer.buf, b"one\n#rejected\ntwo\n");
    }

    #[test]
    fn test_diagnostics_carry_distinct_prefixes() {
        let mut sink = TranscriptSink::new(Vec::new());
        sink.listening().unwrap();
        sink.device_unavailable("no default input device").unwrap();
        sink.bridge_error("engine construction failed").unwrap();

        let out = String::from_utf8(sink.writer).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#listening");
        assert_eq!(lines[1], "#error device-unavailable: no default input device");
        assert_eq!(lines[2], "#error bridge: engine construction failed");
        assert!(lines.iter().all(|line| line.starts_with('#')));
    }
}
