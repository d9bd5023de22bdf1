use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use atomic_float::AtomicF32;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Per-slot playback engine state, shared with the output callback. One of the
/// two instances is audible at a time; the other is a write-only position
/// follower kept in sync by the transport.
pub struct PlayerShared {
    /// Mono samples in [-1, 1], resampled to the output rate.
    pub samples: ArcSwapOption<Vec<f32>>,
    pub playing: AtomicBool,
    /// Fractional sample index at the output rate.
    pub pos_f: AtomicF32,
}

impl PlayerShared {
    pub fn new() -> Self {
        Self {
            samples: ArcSwapOption::from(None),
            playing: AtomicBool::new(false),
            pos_f: AtomicF32::new(0.0),
        }
    }

    pub fn set_samples(&self, samples: Arc<Vec<f32>>) {
        self.samples.store(Some(samples));
        self.playing.store(false, Ordering::Relaxed);
        self.pos_f.store(0.0, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.samples.store(None);
        self.playing.store(false, Ordering::Relaxed);
        self.pos_f.store(0.0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.samples.load().as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position_secs(&self, out_sample_rate: u32) -> f32 {
        if out_sample_rate == 0 {
            return 0.0;
        }
        let pos = self.pos_f.load(Ordering::Relaxed);
        if pos.is_finite() && pos > 0.0 {
            pos / out_sample_rate as f32
        } else {
            0.0
        }
    }

    pub fn set_position_secs(&self, secs: f32, out_sample_rate: u32) {
        let len = self.len();
        let mut pos = secs.max(0.0) * out_sample_rate as f32;
        if !pos.is_finite() {
            pos = 0.0;
        }
        if len > 0 {
            pos = pos.min(len as f32);
        }
        self.pos_f.store(pos, Ordering::Relaxed);
    }
}

impl Default for PlayerShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Output device stream. The callback renders whichever player the swap
/// pointer designates as active, advancing that player's clock; switching
/// tracks swaps the pointer without restarting the stream.
pub struct AudioOutput {
    _stream: cpal::Stream,
    pub out_sample_rate: u32,
}

impl AudioOutput {
    pub fn new(active: Arc<ArcSwap<PlayerShared>>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No default output device")?;
        let cfg = device
            .default_output_config()
            .context("No default output config")?;
        let out_sample_rate = cfg.sample_rate();
        let stream = match cfg.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &cfg.into(), active)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &cfg.into(), active)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &cfg.into(), active)?
            }
            _ => anyhow::bail!("Unsupported sample format"),
        };
        Ok(Self {
            _stream: stream,
            out_sample_rate,
        })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        cfg: &cpal::StreamConfig,
        active: Arc<ArcSwap<PlayerShared>>,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = cfg.channels as usize;
        let err_fn = |e| eprintln!("cpal stream error: {e}");
        let stream = device.build_output_stream(
            cfg,
            move |data: &mut [T], _| {
                let player = active.load();
                let playing = player.playing.load(Ordering::Relaxed);
                let maybe_samples = player.samples.load();
                let samples = match (playing, maybe_samples.as_ref()) {
                    (true, Some(s)) if !s.is_empty() => s,
                    _ => {
                        for frame in data.chunks_mut(channels) {
                            for ch in frame.iter_mut() {
                                *ch = T::from_sample(0.0);
                            }
                        }
                        return;
                    }
                };
                let len = samples.len();
                let mut pos_f = player.pos_f.load(Ordering::Relaxed);
                if !pos_f.is_finite() || pos_f < 0.0 {
                    pos_f = 0.0;
                }
                for frame in data.chunks_mut(channels) {
                    let pos = pos_f.floor() as usize;
                    if pos >= len {
                        // End of buffer; the transport notices on its next tick.
                        player.playing.store(false, Ordering::Relaxed);
                        for ch in frame.iter_mut() {
                            *ch = T::from_sample(0.0);
                        }
                        continue;
                    }
                    let i1 = (pos + 1).min(len - 1);
                    let t = (pos_f - pos as f32).clamp(0.0, 1.0);
                    let s = (samples[pos] * (1.0 - t) + samples[i1] * t).clamp(-1.0, 1.0);
                    for ch in frame.iter_mut() {
                        *ch = T::from_sample(s);
                    }
                    pos_f += 1.0;
                }
                player.pos_f.store(pos_f, Ordering::Relaxed);
            },
            err_fn,
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }
}

/// Linear-interpolation resampler used to bring decoded audio to the output
/// device rate before it is handed to a player.
pub fn resample_linear(mono: &[f32], in_sr: u32, out_sr: u32) -> Vec<f32> {
    if in_sr == out_sr || mono.is_empty() {
        return mono.to_vec();
    }
    if in_sr == 0 || out_sr == 0 {
        return mono.to_vec();
    }
    let ratio = out_sr as f64 / in_sr as f64;
    let out_len = ((mono.len() as f64) * ratio).ceil() as usize;
    if out_len == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(out_len);
    let len = mono.len();
    for i in 0..out_len {
        let src_pos = (i as f64) / ratio;
        let i0 = src_pos.floor() as usize;
        if i0 >= len {
            out.push(mono[len - 1]);
            continue;
        }
        let i1 = (i0 + 1).min(len.saturating_sub(1));
        let t = (src_pos - i0 as f64).clamp(0.0, 1.0) as f32;
        out.push(mono[i0] * (1.0 - t) + mono[i1] * t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_position_round_trips_through_seconds() {
        let p = PlayerShared::new();
        p.set_samples(Arc::new(vec![0.0; 48_000]));
        p.set_position_secs(0.5, 48_000);
        assert!((p.position_secs(48_000) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn player_position_clamps_to_buffer() {
        let p = PlayerShared::new();
        p.set_samples(Arc::new(vec![0.0; 1000]));
        p.set_position_secs(100.0, 48_000);
        assert!(p.pos_f.load(Ordering::Relaxed) <= 1000.0);
        p.set_position_secs(-5.0, 48_000);
        assert_eq!(p.position_secs(48_000), 0.0);
    }

    #[test]
    fn resample_preserves_duration_within_one_sample() {
        let mono = vec![0.25f32; 4410];
        let out = resample_linear(&mono, 44_100, 48_000);
        let expect = (4410.0f64 * 48_000.0 / 44_100.0).ceil() as usize;
        assert_eq!(out.len(), expect);
    }
}
