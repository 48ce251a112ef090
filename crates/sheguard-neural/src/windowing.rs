//! Fixed-stride analysis windows
//!
//! YAMNet scores audio in 0.975 s patches spaced 0.48 s apart. Every
//! invocation with the same length produces identical windows.

use std::ops::Range;

/// YAMNet analysis window, in milliseconds (15 600 samples at 16 kHz).
pub const YAMNET_WINDOW_MS: u32 = 975;
/// YAMNet hop between windows, in milliseconds (7 680 samples at 16 kHz).
pub const YAMNET_HOP_MS: u32 = 480;

/// Fixed-stride windower with configurable hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedStrideWindower {
    /// Window size in samples
    pub window_size: usize,
    /// Hop size in samples
    pub hop_size: usize,
}

impl FixedStrideWindower {
    /// Create a windower with an explicit hop duration
    pub fn with_hop(sample_rate: u32, window_duration_ms: u32, hop_duration_ms: u32) -> Self {
        let window_size = (sample_rate as usize * window_duration_ms as usize) / 1000;
        let hop_size = (sample_rate as usize * hop_duration_ms as usize) / 1000;
        Self {
            window_size: window_size.max(1),
            hop_size: hop_size.max(1),
        }
    }

    /// YAMNet patch layout at `sample_rate`
    pub fn yamnet(sample_rate: u32) -> Self {
        Self::with_hop(sample_rate, YAMNET_WINDOW_MS, YAMNET_HOP_MS)
    }

    /// Segment audio into windows, returning sample ranges
    ///
    /// Audio shorter than one window yields a single short range; a trailing
    /// remainder longer than zero gets one final (short) window so no sample
    /// is left unscored. Short ranges are padded by the consumer.
    pub fn segment(&self, audio_len: usize) -> Vec<Range<usize>> {
        if audio_len == 0 {
            return Vec::new();
        }
        if audio_len <= self.window_size {
            return vec![0..audio_len];
        }

        let covered = audio_len - self.window_size;
        let num_windows = covered.div_ceil(self.hop_size) + 1;
        let mut windows = Vec::with_capacity(num_windows);

        for i in 0..num_windows {
            let start = i * self.hop_size;
            let end = (start + self.window_size).min(audio_len);
            windows.push(start..end);
        }

        windows
    }
}
