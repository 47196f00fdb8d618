//! PCM codec: `f32` samples ⇄ signed 16-bit little-endian wire bytes, and
//! wire text ⇄ raw bytes.
//!
//! Outbound microphone audio is sent as `s16le` mono at 16 kHz; inbound model
//! audio arrives as base64 text wrapping `s16le` at 24 kHz.  Every function in
//! this module is pure.
//!
//! # Example
//!
//! ```rust
//! use voice_concierge::audio::{bytes_to_audio_chunk, encode};
//!
//! let bytes = encode(&[0.0, 0.5, -0.5]);
//! assert_eq!(bytes.len(), 6);
//!
//! let chunk = bytes_to_audio_chunk(&bytes, 16_000, 1).unwrap();
//! assert_eq!(chunk.frames(), 3);
//! ```

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use thiserror::Error;

/// Width of one encoded sample in bytes.
pub const SAMPLE_WIDTH: usize = 2;

/// Full-scale magnitude used when scaling to and from `i16`.
const FULL_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Reasons an inbound payload could not be turned into playable audio.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// The payload is not valid transport (base64) text.
    #[error("malformed audio payload: {0}")]
    MalformedPayload(String),

    /// The decoded bytes do not describe whole samples for every channel.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

// ---------------------------------------------------------------------------
// AudioFrame / AudioChunk
// ---------------------------------------------------------------------------

/// One outbound unit of encoded microphone audio: exactly one capture
/// callback's worth of samples as `s16le` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Encoded little-endian `i16` samples.
    pub bytes: Vec<u8>,
    /// Sample rate of the encoded audio in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Encode `samples` into a new frame.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            bytes: encode(samples),
            sample_rate,
        }
    }

    /// MIME type announced to the remote side alongside the frame.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Number of mono samples carried by the frame.
    pub fn samples(&self) -> usize {
        self.bytes.len() / SAMPLE_WIDTH
    }
}

/// One inbound unit of decoded audio.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    /// Playback length in seconds; `0.0` for a malformed chunk.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns `true` when the chunk can be scheduled: non-empty, with a
    /// non-zero rate and a whole number of frames.
    pub fn is_playable(&self) -> bool {
        self.sample_rate > 0
            && self.channels > 0
            && !self.samples.is_empty()
            && self.samples.len() % self.channels as usize == 0
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Clamp each sample to `[-1, 1]`, scale to the `i16` range and emit
/// little-endian bytes.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for &s in samples {
        // NaN clamps to NaN; treat it as silence.
        let s = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        let v = (s * FULL_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Wrap raw bytes in the transport's text encoding (standard base64).
pub fn encode_wire_payload(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Inverse of [`encode_wire_payload`].
///
/// # Errors
///
/// [`CodecError::MalformedPayload`] when `payload` is not valid base64.
pub fn decode_wire_payload(payload: &str) -> Result<Vec<u8>, CodecError> {
    B64.decode(payload.trim())
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))
}

/// Reinterpret little-endian `i16` bytes as normalised `f32` samples.
///
/// # Errors
///
/// [`CodecError::UnsupportedFormat`] when `channels` or `sample_rate` is zero,
/// or the byte length is not a multiple of `2 * channels`.
pub fn bytes_to_audio_chunk(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<AudioChunk, CodecError> {
    if channels == 0 || sample_rate == 0 {
        return Err(CodecError::UnsupportedFormat(format!(
            "{sample_rate} Hz, {channels} channel(s)"
        )));
    }

    let frame_width = SAMPLE_WIDTH * channels as usize;
    if bytes.len() % frame_width != 0 {
        return Err(CodecError::UnsupportedFormat(format!(
            "{} bytes is not a multiple of {frame_width}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(SAMPLE_WIDTH)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / FULL_SCALE)
        .collect();

    Ok(AudioChunk {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode a transport payload straight into an [`AudioChunk`].
pub fn decode_payload(
    payload: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioChunk, CodecError> {
    let bytes = decode_wire_payload(payload)?;
    bytes_to_audio_chunk(&bytes, sample_rate, channels)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / FULL_SCALE;

    #[test]
    fn encode_is_little_endian() {
        let bytes = encode(&[0.5]);
        assert_eq!(bytes, 16_384_i16.to_le_bytes().to_vec());
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let bytes = encode(&[2.0, -3.0]);
        let a = i16::from_le_bytes([bytes[0], bytes[1]]);
        let b = i16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(a, i16::MAX);
        assert_eq!(b, i16::MIN);
    }

    #[test]
    fn encode_nan_is_silence() {
        assert_eq!(encode(&[f32::NAN]), vec![0, 0]);
    }

    #[test]
    fn round_trip_within_one_quantisation_step() {
        let input: Vec<f32> = (0..=200).map(|i| -1.0 + i as f32 * 0.01).collect();
        let chunk = bytes_to_audio_chunk(&encode(&input), 16_000, 1).unwrap();

        assert_eq!(chunk.samples.len(), input.len());
        for (a, b) in input.iter().zip(&chunk.samples) {
            assert!((a - b).abs() <= STEP, "{a} vs {b}");
        }
    }

    #[test]
    fn odd_byte_count_is_unsupported() {
        let err = bytes_to_audio_chunk(&[0, 0, 0], 24_000, 1).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(_)));
    }

    #[test]
    fn stereo_requires_whole_frames() {
        // 6 bytes = 3 samples, not a whole number of stereo frames.
        let err = bytes_to_audio_chunk(&[0; 6], 24_000, 2).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(_)));

        let ok = bytes_to_audio_chunk(&[0; 8], 24_000, 2).unwrap();
        assert_eq!(ok.frames(), 2);
    }

    #[test]
    fn zero_channels_is_unsupported() {
        assert!(bytes_to_audio_chunk(&[0, 0], 24_000, 0).is_err());
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let err = decode_wire_payload("not*base64!").unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn wire_payload_round_trip() {
        let bytes = encode(&[0.25, -0.25, 0.0]);
        let text = encode_wire_payload(&bytes);
        assert_eq!(decode_wire_payload(&text).unwrap(), bytes);
    }

    #[test]
    fn decode_payload_builds_chunk() {
        let text = encode_wire_payload(&encode(&vec![0.1; 2_400]));
        let chunk = decode_payload(&text, 24_000, 1).unwrap();
        assert!((chunk.duration_secs() - 0.1).abs() < 1e-9);
        assert!(chunk.is_playable());
    }

    #[test]
    fn frame_reports_mime_type_and_length() {
        let frame = AudioFrame::from_samples(&[0.0; 4_096], 16_000);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(frame.samples(), 4_096);
    }

    #[test]
    fn empty_chunk_is_not_playable() {
        let chunk = AudioChunk {
            samples: Vec::new(),
            sample_rate: 24_000,
            channels: 1,
        };
        assert!(!chunk.is_playable());
        assert_eq!(chunk.duration_secs(), 0.0);
    }
}
