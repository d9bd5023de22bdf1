use std::collections::HashMap;
use std::sync::Arc;

use crate::track::{Track, TrackId};

/// Reduce a sample sequence to exactly `width` (min, max) pairs for drawing.
/// Samples are partitioned into contiguous chunks of `ceil(n / width)`; each
/// output pair is one chunk's extrema. Short inputs are padded with silent
/// pairs so the output length is always `width`.
pub fn reduce(samples: &[f32], width: usize) -> Vec<(f32, f32)> {
    let mut out = Vec::with_capacity(width);
    if width == 0 {
        return out;
    }
    if !samples.is_empty() {
        let chunk = samples.len().div_ceil(width);
        for bin in samples.chunks(chunk) {
            let (mut mn, mut mx) = (f32::INFINITY, f32::NEG_INFINITY);
            for &v in bin {
                if v < mn {
                    mn = v;
                }
                if v > mx {
                    mx = v;
                }
            }
            if mn.is_finite() && mx.is_finite() {
                out.push((mn, mx));
            } else {
                out.push((0.0, 0.0));
            }
            if out.len() == width {
                break;
            }
        }
    }
    out.resize(width, (0.0, 0.0));
    out
}

/// Cache of reduced waveforms keyed by `(track id, width)`. Track ids are
/// never reused, so entries for replaced tracks are purged by retaining the
/// live ids only.
#[derive(Default)]
pub struct WaveformCache {
    entries: HashMap<(TrackId, usize), Arc<Vec<(f32, f32)>>>,
}

impl WaveformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&mut self, track: &Track, width: usize) -> Arc<Vec<(f32, f32)>> {
        self.entries
            .entry((track.id, width))
            .or_insert_with(|| Arc::new(reduce(&track.pcm, width)))
            .clone()
    }

    pub fn retain_tracks(&mut self, live: &[TrackId]) {
        self.entries.retain(|(id, _), _| live.contains(id));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
