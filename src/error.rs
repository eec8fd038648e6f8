//! Bridge failure taxonomy.
//!
//! The output protocol needs exactly one distinction: a missing audio input
//! device gets its own diagnostic line so the parent can tell it apart from
//! every other failure. Internals attach context with anyhow as usual.

use thiserror::Error;

/// Fatal bridge errors, reported to the parent as diagnostic lines.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No default audio input device is bound. Listening never starts.
    #[error("no audio input device is available")]
    DeviceUnavailable,

    /// Any other setup or runtime failure (engine construction, model load,
    /// stream build). Reported with the generic bridge prefix.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
