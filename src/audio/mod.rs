//! Audio module: PCM codec, capture framing, gapless playback scheduling and
//! the `cpal` device layer.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → stereo_to_mono → StreamResampler (16 kHz)
//!           → Framer (4096) → encode → AudioFrame → session
//!
//! session → decode_payload → AudioChunk → PlaybackScheduler::enqueue
//!         → CpalPlayback mixer (sample-accurate start times) → speaker
//! ```

pub mod backend;
pub mod capture;
pub mod codec;
pub mod device;
pub mod playback;
pub mod resample;

pub use backend::AudioBackend;
pub use capture::{
    CaptureDevice, CaptureError, CapturePipeline, CaptureStream, Framer, SampleCallback,
    CAPTURE_SAMPLE_RATE, FRAME_SIZE,
};
pub use codec::{
    bytes_to_audio_chunk, decode_payload, decode_wire_payload, encode, encode_wire_payload,
    AudioChunk, AudioFrame, CodecError, SAMPLE_WIDTH,
};
pub use device::{CpalBackend, CpalCapture, CpalPlayback, MicrophoneLease};
pub use playback::{
    PlaybackDevice, PlaybackError, PlaybackScheduler, ScheduledSegment, SegmentId, SegmentSpan,
    PLAYBACK_SAMPLE_RATE, UNSET_CURSOR,
};
pub use resample::{resample, stereo_to_mono, StreamResampler};

#[cfg(test)]
pub use backend::MockBackend;
#[cfg(test)]
pub use capture::{MockCaptureDevice, MockMicrophone};
#[cfg(test)]
pub use playback::{MockClock, MockPlaybackDevice};
