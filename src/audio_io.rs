use std::io::Cursor;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Container kind declared by the uploader. Anything else is rejected before
/// the decoder is invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredFormat {
    Wav,
    Mp3,
}

impl DeclaredFormat {
    /// Accepts the MIME types a file input reports for WAV/MP3, plus the bare
    /// extension names.
    pub fn parse(declared: &str) -> Option<DeclaredFormat> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" | "wav" => Some(DeclaredFormat::Wav),
            "audio/mpeg" | "audio/mp3" | "mp3" => Some(DeclaredFormat::Mp3),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DeclaredFormat::Wav => "wav",
            DeclaredFormat::Mp3 => "mp3",
        }
    }
}

/// Output of a completed decode, ready to be installed as a `Track`.
#[derive(Debug)]
pub struct DecodedAudio {
    pub mono: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub duration_secs: f32,
    pub bit_rate_bps: u32,
    pub loudness_db: f32,
}

fn io_trace_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("MIXREF_TRACE")
            .ok()
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                !(v.is_empty() || v == "0" || v == "false" || v == "off")
            })
            .unwrap_or(false)
    })
}

pub(crate) fn io_trace(event: &str, detail: &str) {
    if !io_trace_enabled() {
        return;
    }
    eprintln!("io_trace event={event} {detail}");
}

/// Decode an uploaded payload to mono samples plus metadata. The declared
/// format only seeds the probe hint; the payload itself decides whether the
/// decode succeeds.
pub fn decode_bytes_mono(bytes: Vec<u8>, format: DeclaredFormat) -> Result<DecodedAudio> {
    let byte_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(format.extension());
    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {} payload", format.extension()))?;
    let mut reader = probed.format;
    let track = reader.default_track().context("no default track")?.clone();
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("open codec")?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channel_count: u16 = 0;
    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(err.into()),
        };
        if sample_rate == 0 {
            sample_rate = decoded.spec().rate;
        }
        let channels = decoded.spec().channels.count().max(1);
        if channel_count == 0 {
            channel_count = channels as u16;
        }
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks(channels) {
            let mut acc = 0.0f32;
            for &v in frame {
                acc += v;
            }
            mono.push(acc / channels as f32);
        }
    }
    if sample_rate == 0 {
        anyhow::bail!("unknown sample rate");
    }
    if mono.is_empty() {
        anyhow::bail!("payload decoded to zero frames");
    }
    let duration_secs = mono.len() as f32 / sample_rate as f32;
    let bit_rate_bps = bit_rate_estimate(byte_len, duration_secs);
    let loudness_db = approx_loudness_db(&mono);
    io_trace(
        "decode",
        &format!(
            "container={} sr={sample_rate} ch={channel_count} frames={} dur={duration_secs:.3}",
            format.extension(),
            mono.len()
        ),
    );
    Ok(DecodedAudio {
        mono,
        sample_rate,
        channel_count,
        duration_secs,
        bit_rate_bps,
        loudness_db,
    })
}

/// File size in bits over decoded duration.
pub fn bit_rate_estimate(byte_len: usize, duration_secs: f32) -> u32 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }
    let bps = (byte_len as f64) * 8.0 / duration_secs as f64;
    if bps.is_finite() && bps > 0.0 {
        bps.round() as u32
    } else {
        0
    }
}

/// Whole-file RMS converted to dB and rounded. A simplified approximation kept
/// as-is; upgrading it to a gated integrated measurement would change the
/// numbers the presentation layer shows.
pub fn approx_loudness_db(mono: &[f32]) -> f32 {
    let rms = crate::meter::rms(mono);
    (20.0 * rms.max(1e-10).log10()).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_format_accepts_wav_and_mp3_only() {
        assert_eq!(DeclaredFormat::parse("audio/wav"), Some(DeclaredFormat::Wav));
        assert_eq!(DeclaredFormat::parse("audio/x-wav"), Some(DeclaredFormat::Wav));
        assert_eq!(DeclaredFormat::parse("audio/mpeg"), Some(DeclaredFormat::Mp3));
        assert_eq!(DeclaredFormat::parse("MP3"), Some(DeclaredFormat::Mp3));
        assert_eq!(DeclaredFormat::parse("image/png"), None);
        assert_eq!(DeclaredFormat::parse("audio/ogg"), None);
        assert_eq!(DeclaredFormat::parse(""), None);
    }

    #[test]
    fn bit_rate_estimate_is_bits_over_seconds() {
        assert_eq!(bit_rate_estimate(1000, 2.0), 4000);
        assert_eq!(bit_rate_estimate(1000, 0.0), 0);
    }

    #[test]
    fn garbage_payload_fails_to_decode() {
        let junk = vec![0x42u8; 256];
        assert!(decode_bytes_mono(junk, DeclaredFormat::Wav).is_err());
    }
}
