//! Audio decoder using Symphonia
//!
//! Turns an encoded byte buffer into mono f32 samples. Decoding follows an
//! explicit plan: the caller's format hint first, then container
//! auto-detection, so mislabeled uploads (a WAV sent as "webm") still decode.

use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::resampler;
use crate::NeuralError;

/// Sample rate every waveform is normalized to before classification.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Lowest native rate accepted from a container header.
pub const MIN_NATIVE_RATE: u32 = 4_000;
/// Highest native rate accepted from a container header.
pub const MAX_NATIVE_RATE: u32 = 384_000;
/// Longest clip decoded, in seconds of source audio.
pub const MAX_DURATION_SECS: usize = 300;

/// Decoded audio before resampling
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels in the source stream
    pub channels: u16,
}

/// Mono, normalized signal at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Build a waveform, clamping samples into [-1.0, 1.0].
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        for s in samples.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        Self {
            samples,
            sample_rate,
        }
    }

    /// Pure sine tone, used by the self-test path.
    pub fn tone(frequency_hz: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Self {
        let len = (sample_rate as f32 * duration_secs) as usize;
        let step = 2.0 * std::f32::consts::PI * frequency_hz / sample_rate as f32;
        let samples = (0..len).map(|i| amplitude * (step * i as f32).sin()).collect();
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// One step of the decode plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeAttempt {
    /// Probe with the caller's declared container extension
    Hinted(String),
    /// Probe with no hint and let Symphonia sniff the container
    Probe,
}

impl std::fmt::Display for DecodeAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeAttempt::Hinted(ext) => write!(f, "format '{}'", ext),
            DecodeAttempt::Probe => write!(f, "auto-detect"),
        }
    }
}

/// Ordered decode attempts for a format hint.
///
/// Accepts bare extensions (`wav`, `.webm`) and MIME types
/// (`audio/webm;codecs=opus`). An empty hint skips straight to auto-detection.
pub fn decode_plan(format_hint: Option<&str>) -> Vec<DecodeAttempt> {
    let ext = format_hint.and_then(normalize_hint);
    match ext {
        Some(ext) => vec![DecodeAttempt::Hinted(ext), DecodeAttempt::Probe],
        None => vec![DecodeAttempt::Probe],
    }
}

fn normalize_hint(hint: &str) -> Option<String> {
    let hint = hint.split(';').next().unwrap_or_default().trim();
    let hint = hint.rsplit('/').next().unwrap_or_default();
    let hint = hint.trim_start_matches('.').to_ascii_lowercase();
    if hint.is_empty() {
        None
    } else {
        Some(hint)
    }
}

/// Decode encoded audio bytes to mono f32 samples at their native rate.
///
/// Runs [`decode_plan`] in order; the first attempt that yields samples wins.
pub fn decode_bytes(bytes: &[u8], format_hint: Option<&str>) -> Result<DecodedAudio, NeuralError> {
    if bytes.is_empty() {
        return Err(NeuralError::Decoder("Audio payload is empty".into()));
    }

    let data: Arc<[u8]> = Arc::from(bytes);
    let mut failures = Vec::new();

    for attempt in decode_plan(format_hint) {
        match decode_attempt(data.clone(), &attempt) {
            Ok(audio) => {
                if !failures.is_empty() {
                    tracing::warn!(
                        "Decoded audio via {} after failed attempt(s): {}",
                        attempt,
                        failures.join("; ")
                    );
                }
                return Ok(audio);
            }
            Err(e) => {
                tracing::debug!("Decode via {} failed: {}", attempt, e);
                failures.push(format!("{}: {}", attempt, e));
            }
        }
    }

    Err(NeuralError::Decoder(format!(
        "Unable to decode audio ({})",
        failures.join("; ")
    )))
}

/// Decode, downmix and resample to `target_rate`.
pub fn decode_to_waveform(
    bytes: &[u8],
    format_hint: Option<&str>,
    target_rate: u32,
) -> Result<Waveform, NeuralError> {
    let audio = decode_bytes(bytes, format_hint)?;
    tracing::debug!(
        "Decoded {} samples at {} Hz ({} channel(s))",
        audio.samples.len(),
        audio.sample_rate,
        audio.channels
    );

    let samples = resampler::resample(&audio.samples, audio.sample_rate, target_rate)?;
    let waveform = Waveform::new(samples, target_rate);
    if waveform.is_empty() {
        return Err(NeuralError::Decoder(
            "Audio is too short to resample".into(),
        ));
    }
    Ok(waveform)
}

fn decode_attempt(data: Arc<[u8]>, attempt: &DecodeAttempt) -> Result<DecodedAudio, NeuralError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let DecodeAttempt::Hinted(ext) = attempt {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| NeuralError::Decoder(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| NeuralError::Decoder("No audio track found".into()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| NeuralError::Decoder("Unknown sample rate".into()))?;

    // Header-declared rates size every later buffer.
    if !(MIN_NATIVE_RATE..=MAX_NATIVE_RATE).contains(&sample_rate) {
        return Err(NeuralError::UnsupportedSampleRate(sample_rate));
    }
    let max_frames = MAX_DURATION_SECS * sample_rate as usize;

    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| NeuralError::Decoder(format!("Failed to create decoder: {}", e)))?;

    let mut all_samples: Vec<f32> = Vec::with_capacity(sample_rate.min(48_000) as usize * 10);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(NeuralError::Decoder(format!("Packet read error: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("Decode error (skipping packet): {}", e);
                continue;
            }
            Err(e) => {
                return Err(NeuralError::Decoder(format!("Fatal decode error: {}", e)));
            }
        };

        // The decoded spec is authoritative when the container omits the layout.
        channels = decoded.spec().channels.count() as u16;

        // Reuse sample buffer
        let too_small = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity());
        if too_small {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
        }

        // i16 → f32 divides by 32768, so PCM lands in [-1.0, 1.0).
        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            all_samples.extend_from_slice(buf.samples());
        }

        if all_samples.len() / channels.max(1) as usize > max_frames {
            return Err(NeuralError::Decoder(format!(
                "Audio is longer than {} seconds",
                MAX_DURATION_SECS
            )));
        }
    }

    if all_samples.is_empty() {
        return Err(NeuralError::Decoder("Stream contained no audio samples".into()));
    }

    let mono_samples = if channels > 1 {
        downmix_to_mono(&all_samples, channels as usize)
    } else {
        all_samples
    };

    Ok(DecodedAudio {
        samples: mono_samples,
        sample_rate,
        channels,
    })
}

/// Downmix interleaved multi-channel audio to mono
fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
