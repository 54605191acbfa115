// Recording modules

pub mod session;
pub mod track;

pub use session::{Recorder, SessionSummary};
pub use track::{append_event, Track};

use crate::devices::MidiError;
use crate::session::StorageError;

/// Error type for a recording attempt
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("MIDI error: {0}")]
    Midi(#[from] MidiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
