//! Audio resampler using Rubato
//!
//! Normalizes all audio to the classifier's sample rate (16 kHz).

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::NeuralError;

const CHUNK_SIZE: usize = 1024;

/// Resample audio to a target sample rate
///
/// Uses Rubato's windowed-sinc `SincFixedIn`. The filter delay is trimmed, so
/// the output starts at the same instant as the input and holds
/// `floor(len * target_rate / source_rate)` samples.
/// If the source rate matches the target, returns a clone.
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, NeuralError> {
    if source_rate == 0 {
        return Err(NeuralError::UnsupportedSampleRate(source_rate));
    }
    if target_rate == 0 {
        return Err(NeuralError::UnsupportedSampleRate(target_rate));
    }
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio
        params,
        CHUNK_SIZE,
        1, // mono
    )
    .map_err(|e| NeuralError::Resampler(format!("Failed to create resampler: {}", e)))?;

    let expected_len = (samples.len() as f64 * ratio) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected_len + delay + CHUNK_SIZE);
    let mut chunk = vec![0.0f32; CHUNK_SIZE];
    let mut pos = 0;

    // Keep feeding (zero-padded past the end) until the delayed tail is flushed.
    while output.len() < delay + expected_len {
        chunk.fill(0.0);
        if pos < samples.len() {
            let end = (pos + CHUNK_SIZE).min(samples.len());
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }

        let resampled = resampler
            .process(std::slice::from_ref(&chunk), None)
            .map_err(|e| NeuralError::Resampler(format!("Resample failed: {}", e)))?;

        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }

        pos += CHUNK_SIZE;
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::{num_complex::Complex, FftPlanner};

    fn sine(freq: f32, sr: u32, secs: f32) -> Vec<f32> {
        let n = (sr as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    /// Frequency of the strongest FFT bin.
    fn dominant_frequency(samples: &[f32], sr: u32) -> f32 {
        let mut buf: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
        FftPlanner::new().plan_fft_forward(buf.len()).process(&mut buf);

        let (bin, _) = buf[1..buf.len() / 2]
            .iter()
            .enumerate()
            .map(|(i, c)| (i + 1, c.norm()))
            .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
        bin as f32 * sr as f32 / samples.len() as f32
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000).unwrap();
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_zero_rate_rejected() {
        let err = resample(&[0.0; 10], 0, 16000).unwrap_err();
        assert!(matches!(err, NeuralError::UnsupportedSampleRate(0)));
        assert!(err.is_bad_input());
    }

    #[test]
    fn test_resample_length_matches_ratio() {
        for &sr in &[8000u32, 22050, 44100, 48000] {
            let samples = sine(440.0, sr, 1.0);
            let result = resample(&samples, sr, 16000).unwrap();
            let expected = (samples.len() as f64 * 16000.0 / sr as f64) as usize;
            assert_eq!(result.len(), expected, "source rate {}", sr);
        }
    }

    #[test]
    fn test_resample_preserves_frequency() {
        for &sr in &[8000u32, 44100, 48000] {
            let result = resample(&sine(440.0, sr, 1.0), sr, 16000).unwrap();
            let freq = dominant_frequency(&result, 16000);
            assert!(
                ((freq - 440.0) / 440.0).abs() < 0.02,
                "{} Hz -> 16 kHz: tone moved to {} Hz",
                sr,
                freq
            );
        }
    }

    #[test]
    fn test_resample_is_time_aligned() {
        // A step at 0.5s should still sit near 0.5s after conversion.
        let sr = 48000;
        let samples: Vec<f32> = (0..sr).map(|i| if i < sr / 2 { 0.0 } else { 0.5 }).collect();
        let result = resample(&samples, sr as u32, 16000).unwrap();
        let first_high = result.iter().position(|&s| s > 0.25).unwrap();
        assert!((first_high as i64 - 8000).abs() < 16, "step at {}", first_high);
    }

    #[test]
    fn test_resample_empty_input() {
        assert!(resample(&[], 44100, 16000).unwrap().is_empty());
    }
}
