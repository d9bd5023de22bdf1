use std::sync::Arc;

use crate::track::Track;

/// Analysis window pulled from the audible track each tick.
pub const METER_WINDOW_SAMPLES: usize = 2048;
/// Display floor; silence and missing windows both read as this.
pub const METER_FLOOR_DB: f32 = -60.0;
/// Bounded release rate. Attack is instantaneous.
pub const METER_RELEASE_DB_PER_TICK: f32 = 3.0;

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for &v in samples {
        sum += (v as f64) * (v as f64);
    }
    (sum / samples.len() as f64).sqrt() as f32
}

/// RMS of one window converted to dB, clamped at the display floor. This is a
/// simplified RMS-to-decibel approximation, deliberately not BS.1770.
pub fn window_db(window: &[f32]) -> f32 {
    let db = 20.0 * rms(window).max(1e-10).log10();
    db.max(METER_FLOOR_DB)
}

/// VU-style level meter: rises immediately on loud content, falls by at most
/// 3 dB per tick on silence.
pub struct LoudnessMeter {
    displayed_db: f32,
}

impl LoudnessMeter {
    pub fn new() -> Self {
        Self {
            displayed_db: METER_FLOOR_DB,
        }
    }

    pub fn level_db(&self) -> f32 {
        self.displayed_db
    }

    /// Drops the displayed level back to the floor, used when the audible
    /// track is torn down.
    pub fn reset(&mut self) {
        self.displayed_db = METER_FLOOR_DB;
    }

    pub fn feed(&mut self, window: &[f32]) -> f32 {
        let incoming = window_db(window);
        self.displayed_db = incoming
            .max(self.displayed_db - METER_RELEASE_DB_PER_TICK)
            .max(METER_FLOOR_DB);
        self.displayed_db
    }
}

impl Default for LoudnessMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent per-slot handle the meter samples through. Created when a track
/// is installed and dropped when its slot is replaced, so a torn-down track
/// can never feed the meter again.
pub struct AnalysisHandle {
    pcm: Arc<Vec<f32>>,
    sample_rate: u32,
}

impl AnalysisHandle {
    pub fn new(track: &Track) -> Self {
        Self {
            pcm: track.pcm.clone(),
            sample_rate: track.sample_rate,
        }
    }

    /// The most recent window of time-domain samples ending at `position`.
    /// Shorter (or empty) near the start of the track.
    pub fn window_at(&self, position_secs: f32) -> &[f32] {
        let len = self.pcm.len();
        if len == 0 || self.sample_rate == 0 || !position_secs.is_finite() {
            return &[];
        }
        let end = ((position_secs.max(0.0) * self.sample_rate as f32) as usize).min(len);
        let start = end.saturating_sub(METER_WINDOW_SAMPLES);
        &self.pcm[start..end]
    }
}
