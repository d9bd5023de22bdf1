pub mod audio;
pub mod audio_io;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod loops;
pub mod meter;
pub mod track;
pub mod validate;
pub mod waveform;

pub use engine::{Engine, TickReport, TransportPhase, TransportState};
pub use error::EngineError;
pub use gesture::{GestureEvent, WaveformGesture};
pub use loops::LoopRegion;
pub use track::{SlotStatus, Track, TrackId, TrackSlot};
