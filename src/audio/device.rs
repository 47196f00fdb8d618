//! `cpal` implementations of the capture and playback device contexts.
//!
//! * [`CpalCapture`]: picks an input device and, on
//!   [`acquire`](CaptureDevice::acquire), opens the microphone stream.  The
//!   callback downmixes to mono and resamples from the device's native rate
//!   to the requested rate before handing samples on.
//! * [`CpalPlayback`]: opens an output stream driven by a small mixer.  The
//!   mixer's running frame counter *is* the device clock reported by
//!   [`now`](PlaybackDevice::now), so scheduled start times are
//!   sample-accurate.
//! * [`CpalBackend`]: opens both according to [`AudioSettings`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};

use super::backend::AudioBackend;
use super::capture::{CaptureDevice, CaptureError, CaptureStream, SampleCallback};
use super::playback::{PlaybackDevice, PlaybackError, ScheduledSegment, SegmentId};
use super::resample::{resample, stereo_to_mono, StreamResampler};
use crate::config::AudioSettings;

// ---------------------------------------------------------------------------
// MicrophoneLease
// ---------------------------------------------------------------------------

static MICROPHONE_IN_USE: AtomicBool = AtomicBool::new(false);

/// Process-wide claim on the microphone.  At most one lease per flag exists
/// at a time; dropping the lease gives the microphone back.
#[derive(Debug)]
pub struct MicrophoneLease {
    flag: &'static AtomicBool,
}

impl MicrophoneLease {
    /// Claim the process microphone.
    pub fn acquire() -> Option<Self> {
        Self::acquire_flag(&MICROPHONE_IN_USE)
    }

    fn acquire_flag(flag: &'static AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for MicrophoneLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// Capture device context built on the default (or named) cpal input device.
pub struct CpalCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    /// Native rate reported by the device (Hz).
    native_rate: u32,
    channels: u16,
    /// Rate delivered to the sample callback (Hz).
    target_rate: u32,
}

impl CpalCapture {
    /// Open the input device named `device_name`, or the system default.
    ///
    /// # Errors
    ///
    /// [`CaptureError::DeviceUnavailable`] when no matching device exists or
    /// it cannot report a default configuration.
    pub fn open(device_name: Option<&str>, target_rate: u32) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("cannot enumerate: {e}")))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!("input device '{name}' not found"))
                })?,
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no input device".into()))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let native_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "capture: using '{}' ({native_rate} Hz, {channels} ch, {sample_format:?})",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );

        Ok(Self {
            device,
            config,
            sample_format,
            native_rate,
            channels,
            target_rate,
        })
    }

    fn build<T>(&self, mut on_samples: SampleCallback) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.channels;
        let mut resampler = StreamResampler::new(self.native_rate, self.target_rate);
        let mut scratch: Vec<f32> = Vec::new();

        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| f32::from_sample_(s)));
                    let mono = stereo_to_mono(&scratch, channels);
                    let out = resampler.process(&mono);
                    if !out.is_empty() {
                        on_samples(&out);
                    }
                },
                |err: cpal::StreamError| {
                    log::error!("capture: cpal stream error: {err}");
                },
                None,
            )
            .map_err(classify_build_error)
    }
}

/// Map cpal's build errors onto the permission / availability taxonomy.
fn classify_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device no longer available".into())
        }
        cpal::BuildStreamError::BackendSpecific { err } if is_permission_error(&err.description) => {
            CaptureError::PermissionDenied(err.description)
        }
        other => CaptureError::BuildStream(other),
    }
}

fn is_permission_error(description: &str) -> bool {
    let d = description.to_ascii_lowercase();
    ["permission", "denied", "not authorized", "access"]
        .iter()
        .any(|needle| d.contains(needle))
}

impl CaptureDevice for CpalCapture {
    fn acquire(
        &mut self,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let lease = MicrophoneLease::acquire()
            .ok_or_else(|| CaptureError::DeviceUnavailable("microphone already in use".into()))?;

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build::<f32>(on_samples)?,
            SampleFormat::I16 => self.build::<i16>(on_samples)?,
            SampleFormat::U16 => self.build::<u16>(on_samples)?,
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        };
        stream.play()?;

        Ok(Box::new(CpalCaptureStream {
            stream: Some(stream),
            lease: Some(lease),
        }))
    }
}

struct CpalCaptureStream {
    stream: Option<cpal::Stream>,
    lease: Option<MicrophoneLease>,
}

impl CaptureStream for CpalCaptureStream {
    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("capture: pause on release failed: {e}");
            }
        }
        self.lease = None;
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

struct Voice {
    segment: ScheduledSegment,
    /// Mono samples at the device rate.
    samples: Vec<f32>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sums every voice that overlaps the frames being rendered.
#[derive(Default)]
struct Mixer {
    frames_played: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    /// Queue `voice`, keeping voices ordered by start frame.
    ///
    /// A voice whose start frame has already been rendered plays from its
    /// first sample on the next buffer.
    fn push(&mut self, mut voice: Voice) {
        voice.start_frame = voice.start_frame.max(self.frames_played);
        let at = self
            .voices
            .partition_point(|v| v.start_frame <= voice.start_frame);
        self.voices.insert(at, voice);
    }

    /// Render `out.len()` mono samples into `out`, then return the voices
    /// that have played out.
    fn render(&mut self, out: &mut [f32]) -> Vec<Voice> {
        let base = self.frames_played;
        let end = base + out.len() as u64;
        out.fill(0.0);

        for v in self.voices.iter().take_while(|v| v.start_frame < end) {
            let from = v.start_frame.max(base);
            let to = v.end_frame().min(end);
            for t in from..to {
                out[(t - base) as usize] += v.samples[(t - v.start_frame) as usize];
            }
        }
        for slot in out.iter_mut() {
            *slot = slot.clamp(-1.0, 1.0);
        }
        self.frames_played = end;

        let (done, live): (Vec<_>, Vec<_>) =
            self.voices.drain(..).partition(|v| v.end_frame() <= end);
        self.voices = live;
        done
    }
}

fn lock_mixer(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// CpalPlayback
// ---------------------------------------------------------------------------

/// Playback device context built on the default (or named) cpal output
/// device.
pub struct CpalPlayback {
    mixer: Arc<Mutex<Mixer>>,
    stream: Option<cpal::Stream>,
    device_rate: u32,
}

impl CpalPlayback {
    /// Open the output device and start its clock.
    ///
    /// A configuration running at `sample_rate` is preferred; otherwise the
    /// device default is used and segments are resampled as they arrive.
    pub fn open(device_name: Option<&str>, sample_rate: u32) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| PlaybackError::DeviceUnavailable(format!("cannot enumerate: {e}")))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    PlaybackError::DeviceUnavailable(format!("output device '{name}' not found"))
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| PlaybackError::DeviceUnavailable("no output device".into()))?,
        };

        let supported = preferred_output_config(&device, sample_rate)?;
        let sample_format = supported.sample_format();
        let device_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "playback: using '{}' ({device_rate} Hz, {} ch, {sample_format:?})",
            device.name().unwrap_or_else(|_| "<unknown>".into()),
            config.channels
        );

        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let stream = match sample_format {
            SampleFormat::F32 => build_output::<f32>(&device, &config, Arc::clone(&mixer))?,
            SampleFormat::I16 => build_output::<i16>(&device, &config, Arc::clone(&mixer))?,
            SampleFormat::U16 => build_output::<u16>(&device, &config, Arc::clone(&mixer))?,
            other => {
                return Err(PlaybackError::DeviceUnavailable(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        Ok(Self {
            mixer,
            stream: Some(stream),
            device_rate,
        })
    }
}

fn preferred_output_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, PlaybackError> {
    let wanted = cpal::SampleRate(sample_rate);
    let exact = device.supported_output_configs().ok().and_then(|configs| {
        configs
            .filter(|c| c.min_sample_rate() <= wanted && wanted <= c.max_sample_rate())
            .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
            .min_by_key(|c| c.channels())
            .map(|c| c.with_sample_rate(wanted))
    });

    match exact {
        Some(config) => Ok(config),
        None => device
            .default_output_config()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string())),
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                let finished = lock_mixer(&mixer).render(&mut mono);

                for (frame, &s) in data.chunks_mut(channels).zip(mono.iter()) {
                    for out in frame.iter_mut() {
                        *out = T::from_sample_(s);
                    }
                }
                // Hooks run outside the mixer lock.
                for voice in finished {
                    voice.segment.complete();
                }
            },
            |err: cpal::StreamError| {
                log::error!("playback: cpal stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))
}

impl PlaybackDevice for CpalPlayback {
    fn now(&self) -> f64 {
        lock_mixer(&self.mixer).frames_played as f64 / self.device_rate as f64
    }

    fn start(&mut self, segment: ScheduledSegment) -> Result<(), PlaybackError> {
        if self.stream.is_none() {
            return Err(PlaybackError::Closed);
        }

        let chunk = &segment.chunk;
        let mono = stereo_to_mono(&chunk.samples, chunk.channels);
        let samples = resample(&mono, chunk.sample_rate, self.device_rate);
        let start_frame = (segment.start_at * self.device_rate as f64).round() as u64;

        lock_mixer(&self.mixer).push(Voice {
            segment,
            samples,
            start_frame,
        });
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        lock_mixer(&self.mixer).voices.retain(|v| v.segment.id != id);
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("playback: pause on close failed: {e}");
            }
        }
        lock_mixer(&self.mixer).voices.clear();
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Opens cpal devices, honouring the device names in [`AudioSettings`].
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    settings: AudioSettings,
}

impl CpalBackend {
    pub fn new(settings: AudioSettings) -> Self {
        Self { settings }
    }
}

impl AudioBackend for CpalBackend {
    type Capture = CpalCapture;
    type Playback = CpalPlayback;

    fn open_capture(&mut self, sample_rate: u32) -> Result<CpalCapture, CaptureError> {
        CpalCapture::open(self.settings.input_device.as_deref(), sample_rate)
    }

    fn open_playback(&mut self, sample_rate: u32) -> Result<CpalPlayback, PlaybackError> {
        CpalPlayback::open(self.settings.output_device.as_deref(), sample_rate)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::AudioChunk;

    fn voice(id: SegmentId, start_frame: u64, samples: Vec<f32>) -> Voice {
        let chunk = AudioChunk {
            samples: samples.clone(),
            sample_rate: 24_000,
            channels: 1,
        };
        Voice {
            segment: ScheduledSegment::new(id, chunk, 0.0, Box::new(|_| {})),
            samples,
            start_frame,
        }
    }

    #[test]
    fn lease_is_exclusive_until_dropped() {
        static FLAG: AtomicBool = AtomicBool::new(false);

        let first = MicrophoneLease::acquire_flag(&FLAG).expect("first lease");
        assert!(MicrophoneLease::acquire_flag(&FLAG).is_none());

        drop(first);
        assert!(MicrophoneLease::acquire_flag(&FLAG).is_some());
    }

    #[test]
    fn permission_errors_are_recognised() {
        assert!(is_permission_error("Access denied by user"));
        assert!(is_permission_error("Permission not granted"));
        assert!(!is_permission_error("buffer underrun"));
    }

    #[test]
    fn mixer_places_voices_on_their_start_frame() {
        let mut mixer = Mixer::default();
        mixer.push(voice(1, 2, vec![0.5, 0.5]));

        let mut out = vec![0.0; 5];
        let done = mixer.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.0]);
        assert_eq!(done.len(), 1);
        assert_eq!(mixer.frames_played, 5);
    }

    #[test]
    fn mixer_keeps_back_to_back_voices_gapless() {
        let mut mixer = Mixer::default();
        mixer.push(voice(1, 0, vec![0.1; 3]));
        mixer.push(voice(2, 3, vec![0.2; 3]));

        let mut first = vec![0.0; 4];
        let done = mixer.render(&mut first);
        assert_eq!(done.len(), 1);
        assert_eq!(mixer.voices.len(), 1);

        let mut second = vec![0.0; 4];
        mixer.render(&mut second);
        let joined: Vec<f32> = first.into_iter().chain(second).collect();
        let expected = [0.1, 0.1, 0.1, 0.2, 0.2, 0.2, 0.0, 0.0];
        for (a, b) in joined.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn mixer_clamps_overlapping_voices() {
        let mut mixer = Mixer::default();
        mixer.push(voice(1, 0, vec![0.8]));
        mixer.push(voice(2, 0, vec![0.8]));

        let mut out = vec![0.0; 1];
        mixer.render(&mut out);
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn late_voice_plays_from_its_first_sample() {
        let mut mixer = Mixer::default();
        let mut silence = vec![0.0; 4];
        mixer.render(&mut silence);

        mixer.push(voice(1, 2, vec![0.1, 0.2, 0.3, 0.4]));
        let mut out = vec![0.0; 4];
        let done = mixer.render(&mut out);

        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn voices_stay_ordered_by_start_frame() {
        let mut mixer = Mixer::default();
        mixer.push(voice(1, 8, vec![0.3]));
        mixer.push(voice(2, 0, vec![0.1]));
        mixer.push(voice(3, 4, vec![0.2]));

        let starts: Vec<u64> = mixer.voices.iter().map(|v| v.start_frame).collect();
        assert_eq!(starts, vec![0, 4, 8]);

        let mut out = vec![0.0; 6];
        let done = mixer.render(&mut out);
        assert_eq!(out, vec![0.1, 0.0, 0.0, 0.0, 0.2, 0.0]);
        assert_eq!(done.len(), 2);
        assert_eq!(mixer.voices.len(), 1);
    }
}
