//! The seam through which a session opens its two audio device contexts.

use super::capture::{CaptureDevice, CaptureError};
use super::playback::{PlaybackDevice, PlaybackError};

/// Opens the capture and playback device contexts for one session.
///
/// Both contexts are owned by the session that opened them and are released
/// on teardown; nothing else may open them.
pub trait AudioBackend {
    type Capture: CaptureDevice;
    type Playback: PlaybackDevice;

    /// Open the capture context.  This does not acquire the microphone yet.
    fn open_capture(&mut self, sample_rate: u32) -> Result<Self::Capture, CaptureError>;

    /// Open the playback context, running its clock from zero.
    fn open_playback(&mut self, sample_rate: u32) -> Result<Self::Playback, PlaybackError>;
}

#[cfg(test)]
pub use mock::MockBackend;

#[cfg(test)]
mod mock {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audio::capture::{MockCaptureDevice, MockMicrophone};
    use crate::audio::playback::{MockClock, MockPlaybackDevice};

    /// Backend handing out mock devices that share state with the test.
    #[derive(Clone, Default)]
    pub struct MockBackend {
        pub mic: MockMicrophone,
        pub clock: MockClock,
        deny_microphone: bool,
        no_output: bool,
        opened: Arc<Mutex<Vec<(&'static str, u32)>>>,
    }

    impl MockBackend {
        /// Microphone acquisition is refused.
        pub fn deny_microphone(mut self) -> Self {
            self.deny_microphone = true;
            self
        }

        /// No output device is present.
        pub fn without_output(mut self) -> Self {
            self.no_output = true;
            self
        }

        /// `(kind, sample_rate)` for every context opened so far.
        pub fn opened(&self) -> Vec<(&'static str, u32)> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl AudioBackend for MockBackend {
        type Capture = MockCaptureDevice;
        type Playback = MockPlaybackDevice;

        fn open_capture(&mut self, sample_rate: u32) -> Result<Self::Capture, CaptureError> {
            self.opened.lock().unwrap().push(("capture", sample_rate));
            Ok(if self.deny_microphone {
                MockCaptureDevice::denied(self.mic.clone())
            } else {
                MockCaptureDevice::new(self.mic.clone())
            })
        }

        fn open_playback(&mut self, sample_rate: u32) -> Result<Self::Playback, PlaybackError> {
            if self.no_output {
                return Err(PlaybackError::DeviceUnavailable("no output device".into()));
            }
            self.opened.lock().unwrap().push(("playback", sample_rate));
            self.clock.reopen();
            Ok(MockPlaybackDevice::new(self.clock.clone()))
        }
    }
}
