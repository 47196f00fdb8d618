//! Channel mixing and sample-rate conversion.
//!
//! Microphones rarely run at 16 kHz natively and output devices rarely run at
//! 24 kHz, so both directions need conversion:
//!
//! 1. [`stereo_to_mono`]: downmix interleaved channels to mono.
//! 2. [`resample`]: one-shot conversion of a complete buffer (playback side,
//!    one inbound chunk at a time).
//! 3. [`StreamResampler`]: continuous conversion of a live stream (capture
//!    side).  It carries its interpolation phase across calls so the output
//!    has no gaps or repeated samples at callback boundaries.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input as an owned `Vec`.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use voice_concierge::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!(mono[0].abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample a complete mono buffer from `from_rate` to `to_rate` Hz using
/// linear interpolation.
///
/// Equal rates and empty input are returned unchanged.  The output holds
/// `floor(len * to_rate / from_rate)` samples, so it never outlasts the
/// input's duration at the new rate.
///
/// ```rust
/// use voice_concierge::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample(&hi, 48_000, 16_000).len(), 160);
/// ```
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Linear-interpolation resampler for a continuous mono stream.
///
/// Output sample `k` is taken at source position `k * step` where
/// `step = from_rate / to_rate`, counted from the very first input sample
/// ever pushed, regardless of how the input is split into calls.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    step: f64,
    /// Source position of the next output sample, relative to `prev`.
    phase: f64,
    /// Last sample of the previous call; `None` before the first sample.
    prev: Option<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let step = if from_rate == 0 || to_rate == 0 {
            1.0
        } else {
            from_rate as f64 / to_rate as f64
        };
        Self {
            step,
            phase: 0.0,
            prev: None,
        }
    }

    /// `true` when input and output rates match.
    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Convert the next slice of input, returning every output sample whose
    /// interpolation window is now complete.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }
        if self.is_passthrough() {
            return input.to_vec();
        }

        // Index 0 of this virtual buffer is `prev` when we have one.
        let offset = usize::from(self.prev.is_some());
        let at = |i: usize| -> f32 {
            if i < offset {
                self.prev.unwrap_or(0.0)
            } else {
                input[i - offset]
            }
        };
        let len = input.len() + offset;

        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        let mut pos = self.phase;
        // Need samples at floor(pos) and floor(pos) + 1, except for an exact hit.
        while (pos as usize) + 1 < len || (pos.fract() == 0.0 && (pos as usize) < len) {
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let sample = if frac == 0.0 {
                at(idx)
            } else {
                at(idx) * (1.0 - frac) + at(idx + 1) * frac
            };
            out.push(sample);
            pos += self.step;
        }

        // Re-anchor on the last input sample for the next call.
        let last = len - 1;
        self.phase = pos - last as f64;
        self.prev = input.last().copied();
        out
    }

    /// Forget any carried state (new stream).
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.prev = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample(&input, 24_000, 24_000), input);
    }

    #[test]
    fn resample_24k_to_48k_doubles_length() {
        let out = resample(&vec![0.0_f32; 240], 24_000, 48_000);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn resample_never_outlasts_the_input() {
        // 0.1 s at 24 kHz is 4410 samples at 44.1 kHz; 101 samples is 185.59.
        assert_eq!(resample(&vec![0.0_f32; 2_400], 24_000, 44_100).len(), 4_410);
        assert_eq!(resample(&vec![0.0_f32; 101], 24_000, 44_100).len(), 185);
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        let out = resample(&vec![0.5_f32; 480], 48_000, 16_000);
        assert_eq!(out.len(), 160);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-5));
    }

    // ---- StreamResampler ---------------------------------------------------

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn stream_passthrough_at_equal_rates() {
        let mut rs = StreamResampler::new(16_000, 16_000);
        assert!(rs.is_passthrough());
        assert_eq!(rs.process(&[1.0, 2.0]), vec![1.0, 2.0]);
    }

    #[test]
    fn stream_downsample_by_three_picks_every_third() {
        let mut rs = StreamResampler::new(48_000, 16_000);
        let out = rs.process(&ramp(9));
        assert_eq!(out, vec![0.0, 3.0, 6.0]);
    }

    #[test]
    fn stream_split_matches_single_call() {
        let input = ramp(1_000);

        let mut whole = StreamResampler::new(44_100, 16_000);
        let expected = whole.process(&input);

        let mut split = StreamResampler::new(44_100, 16_000);
        let mut got = Vec::new();
        for part in input.chunks(37) {
            got.extend(split.process(part));
        }

        assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn stream_output_is_strictly_increasing_on_a_ramp() {
        // No duplicated or skipped positions across call boundaries.
        let mut rs = StreamResampler::new(48_000, 16_000);
        let mut out = Vec::new();
        for part in ramp(4_800).chunks(441) {
            out.extend(rs.process(part));
        }
        assert_eq!(out.len(), 1_600);
        for w in out.windows(2) {
            assert!((w[1] - w[0] - 3.0).abs() < 1e-3);
        }
    }

    #[test]
    fn stream_upsample_interpolates() {
        let mut rs = StreamResampler::new(8_000, 16_000);
        let out = rs.process(&[0.0, 1.0, 2.0]);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn reset_starts_a_new_stream() {
        let mut rs = StreamResampler::new(48_000, 16_000);
        rs.process(&ramp(10));
        rs.reset();
        assert_eq!(rs.process(&[5.0, 6.0, 7.0]), vec![5.0]);
    }
}
