//! Capture pipeline: microphone samples → fixed 4096-sample frames →
//! encoded [`AudioFrame`]s.
//!
//! A [`CaptureDevice`] delivers mono `f32` samples at [`CAPTURE_SAMPLE_RATE`]
//! in whatever slice sizes the hardware produces.  [`CapturePipeline`] feeds
//! them through a [`Framer`] so the sink sees exactly one [`AudioFrame`] per
//! [`FRAME_SIZE`] samples, in capture order, with nothing dropped or repeated
//! between frames.
//!
//! Dropping or [`stop`](CapturePipeline::stop)ping the pipeline releases the
//! microphone.

use thiserror::Error;

use super::codec::AudioFrame;

/// Microphone sample rate expected by the remote session (Hz).
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Samples per outbound frame (mono).
pub const FRAME_SIZE: usize = 4_096;

/// Callback a [`CaptureDevice`] invokes with each slice of mono samples.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while acquiring or running the microphone.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture pipeline is already running")]
    AlreadyRunning,

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// Device seam
// ---------------------------------------------------------------------------

/// An opened capture device context that can hand out the microphone.
pub trait CaptureDevice {
    /// Acquire the microphone and start calling `on_samples` with mono
    /// samples at [`CAPTURE_SAMPLE_RATE`].
    ///
    /// # Errors
    ///
    /// [`CaptureError::PermissionDenied`] or
    /// [`CaptureError::DeviceUnavailable`] when the microphone cannot be
    /// acquired.
    fn acquire(&mut self, on_samples: SampleCallback)
        -> Result<Box<dyn CaptureStream>, CaptureError>;

    /// Release the device context itself.  Called once on teardown.
    fn close(&mut self) {}
}

/// A live microphone stream.  Dropping it must also release the microphone.
pub trait CaptureStream {
    /// Stop delivering samples and release the microphone track.
    fn release(&mut self);
}

// ---------------------------------------------------------------------------
// Framer
// ---------------------------------------------------------------------------

/// Fixed-size framing stage: accumulates samples and yields complete
/// frames of exactly `frame_size` samples.
#[derive(Debug)]
pub struct Framer {
    frame_size: usize,
    pending: Vec<f32>,
}

impl Framer {
    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn new(frame_size: usize) -> Self {
        assert!(frame_size > 0, "Framer frame_size must be > 0");
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append `samples`, calling `emit` once per completed frame.
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.frame_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Samples waiting for the current frame to fill.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

// ---------------------------------------------------------------------------
// CapturePipeline
// ---------------------------------------------------------------------------

/// Owns the live microphone stream while capture is running.
///
/// ```rust,ignore
/// let mut capture = CapturePipeline::new();
/// capture.start(&mut device, move |frame| { let _ = tx.send(frame); })?;
/// // ...
/// capture.stop(); // idempotent
/// ```
#[derive(Default)]
pub struct CapturePipeline {
    stream: Option<Box<dyn CaptureStream>>,
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the microphone from `device` and start framing.
    ///
    /// Each completed frame is encoded on the capture callback and handed to
    /// `sink` synchronously.  The sink decides whether anything is listening;
    /// frames are never buffered here.
    ///
    /// # Errors
    ///
    /// [`CaptureError::AlreadyRunning`] when called twice without `stop`, or
    /// whatever the device reports on acquisition.
    pub fn start<D, F>(&mut self, device: &mut D, mut sink: F) -> Result<(), CaptureError>
    where
        D: CaptureDevice + ?Sized,
        F: FnMut(AudioFrame) + Send + 'static,
    {
        if self.stream.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let mut framer = Framer::new(FRAME_SIZE);
        let on_samples: SampleCallback = Box::new(move |samples: &[f32]| {
            framer.push(samples, |frame| {
                sink(AudioFrame::from_samples(frame, CAPTURE_SAMPLE_RATE));
            });
        });

        let stream = device.acquire(on_samples)?;
        self.stream = Some(stream);
        log::debug!("capture: microphone acquired");
        Ok(())
    }

    /// Disconnect the framing stage and release the microphone.
    ///
    /// Safe to call repeatedly or before [`start`](Self::start).
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            log::debug!("capture: microphone released");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// MockCaptureDevice
// ---------------------------------------------------------------------------

/// Test double that lets a test push samples as if the hardware had
/// delivered them.
#[cfg(test)]
pub use mock::{MockCaptureDevice, MockMicrophone};

#[cfg(test)]
mod mock {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Shared view of the mock microphone, held by the test.
    #[derive(Clone, Default)]
    pub struct MockMicrophone {
        inner: Arc<Mutex<MicInner>>,
    }

    #[derive(Default)]
    struct MicInner {
        callback: Option<SampleCallback>,
        acquisitions: usize,
        releases: usize,
        closed: bool,
    }

    impl MockMicrophone {
        /// Deliver `samples` to the active callback.  Returns `false` when
        /// the microphone is not acquired.
        pub fn feed(&self, samples: &[f32]) -> bool {
            let mut inner = self.inner.lock().unwrap();
            match inner.callback.as_mut() {
                Some(cb) => {
                    cb(samples);
                    true
                }
                None => false,
            }
        }

        pub fn is_live(&self) -> bool {
            self.inner.lock().unwrap().callback.is_some()
        }

        pub fn acquisitions(&self) -> usize {
            self.inner.lock().unwrap().acquisitions
        }

        pub fn releases(&self) -> usize {
            self.inner.lock().unwrap().releases
        }

        pub fn is_closed(&self) -> bool {
            self.inner.lock().unwrap().closed
        }
    }

    pub struct MockCaptureDevice {
        mic: MockMicrophone,
        deny: bool,
    }

    impl MockCaptureDevice {
        pub fn new(mic: MockMicrophone) -> Self {
            Self { mic, deny: false }
        }

        /// A device whose microphone permission is refused.
        pub fn denied(mic: MockMicrophone) -> Self {
            Self { mic, deny: true }
        }
    }

    struct MockStream {
        mic: MockMicrophone,
        released: bool,
    }

    impl CaptureStream for MockStream {
        fn release(&mut self) {
            if !self.released {
                self.released = true;
                let mut inner = self.mic.inner.lock().unwrap();
                inner.callback = None;
                inner.releases += 1;
            }
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.release();
        }
    }

    impl CaptureDevice for MockCaptureDevice {
        fn acquire(
            &mut self,
            on_samples: SampleCallback,
        ) -> Result<Box<dyn CaptureStream>, CaptureError> {
            if self.deny {
                return Err(CaptureError::PermissionDenied("denied by test".into()));
            }
            let mut inner = self.mic.inner.lock().unwrap();
            inner.callback = Some(on_samples);
            inner.acquisitions += 1;
            Ok(Box::new(MockStream {
                mic: self.mic.clone(),
                released: false,
            }))
        }

        fn close(&mut self) {
            self.mic.inner.lock().unwrap().closed = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
