//! The bridge between the recognition engine and the parent process.
//!
//! Owns the stdout line protocol and the loop that turns recognition events
//! into flushed output lines.

mod forward;
mod output;

pub use forward::forward_events;
pub use output::TranscriptSink;
