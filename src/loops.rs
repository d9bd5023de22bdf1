/// A user-selected `[start, end)` window in seconds confining playback of the
/// active track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopRegion {
    pub start: f32,
    pub end: f32,
}

impl LoopRegion {
    /// Returns `None` unless `0 <= start < end`.
    pub fn new(start: f32, end: f32) -> Option<LoopRegion> {
        if start.is_finite() && end.is_finite() && start >= 0.0 && end > start {
            Some(LoopRegion { start, end })
        } else {
            None
        }
    }

    /// Map two pixel columns over a waveform of `width` pixels proportionally
    /// onto `[0, duration]` and order them. A zero-length selection is no
    /// region at all.
    pub fn from_drag(x0: f32, x1: f32, width: f32, duration: f32) -> Option<LoopRegion> {
        if width <= 0.0 || duration <= 0.0 {
            return None;
        }
        let t0 = (x0 / width).clamp(0.0, 1.0) * duration;
        let t1 = (x1 / width).clamp(0.0, 1.0) * duration;
        LoopRegion::new(t0.min(t1), t0.max(t1))
    }

    /// Clamp the region to a track duration, dropping it if nothing remains.
    pub fn clamped_to(self, duration: f32) -> Option<LoopRegion> {
        LoopRegion::new(self.start.min(duration), self.end.min(duration))
    }

    pub fn len_secs(&self) -> f32 {
        self.end - self.start
    }
}

/// Holds the optional loop region and answers the per-tick wrap check.
#[derive(Default)]
pub struct LoopEngine {
    region: Option<LoopRegion>,
}

impl LoopEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any existing region wholesale.
    pub fn set_region(&mut self, region: Option<LoopRegion>) {
        self.region = region;
    }

    pub fn clear(&mut self) {
        self.region = None;
    }

    pub fn region(&self) -> Option<LoopRegion> {
        self.region
    }

    /// If a region is set and `position` has reached its end, returns the
    /// start to jump back to. Playback continues through the jump; the caller
    /// must not emit a pause/resume.
    pub fn wrap(&self, position: f32) -> Option<f32> {
        match self.region {
            Some(r) if position >= r.end => Some(r.start),
            _ => None,
        }
    }
}
