use std::sync::Arc;

pub type TrackId = u64;

/// The two upload slots. Exactly one is audible at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackSlot {
    Master,
    Reference,
}

impl TrackSlot {
    pub const ALL: [TrackSlot; 2] = [TrackSlot::Master, TrackSlot::Reference];

    pub fn other(self) -> TrackSlot {
        match self {
            TrackSlot::Master => TrackSlot::Reference,
            TrackSlot::Reference => TrackSlot::Master,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            TrackSlot::Master => 0,
            TrackSlot::Reference => 1,
        }
    }
}

/// A fully decoded track. Immutable once built; a re-upload to the same slot
/// replaces it wholesale.
#[derive(Clone, Debug)]
pub struct Track {
    pub id: TrackId,
    /// Mono-summed samples in [-1, 1] at `sample_rate`.
    pub pcm: Arc<Vec<f32>>,
    pub sample_rate: u32,
    /// Channel count of the source file before the mono mixdown.
    pub channel_count: u16,
    pub duration_secs: f32,
    /// File size in bits divided by decoded duration. An estimate, not the
    /// container's declared bitrate.
    pub bit_rate_bps: u32,
    /// Whole-file RMS converted to dB at load time. A labeled approximation,
    /// not an integrated loudness measurement.
    pub loudness_db: f32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Loading,
    Ready,
    Failed(String),
}
