use thiserror::Error;

use crate::track::TrackSlot;

/// Engine-level error taxonomy. A failed upload or decode is terminal for its
/// slot only; the other slot and the transport keep working.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Declared type is not WAV or MP3. Rejected at the boundary; the decoder
    /// is never invoked and the slot stays as it was.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Recognized declared type, but the payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Waveform or metadata requested before the slot's decode completed.
    /// A normal transient, not a fault; re-request once the slot is ready.
    #[error("analysis not available for {0:?} slot")]
    AnalysisUnavailable(TrackSlot),
}
