//! Gapless playback scheduling against a free-running hardware clock.
//!
//! Inbound chunks arrive asynchronously and their boundaries have nothing to
//! do with the output device's buffer size.  [`PlaybackScheduler`] keeps a
//! `cursor` (the time on the device clock at which the next chunk may start)
//! and places every chunk at `max(cursor, now)`:
//!
//! ```text
//!  device clock ─────────────────────────────────────────────▶
//!                 now
//!                  │
//!  chunk 1         [=========)
//!  chunk 2                   [======)          ← back-to-back, no gap
//!  chunk 3 (late)                        now'  [=====)   ← never in the past
//! ```
//!
//! [`interrupt`](PlaybackScheduler::interrupt) stops every pending segment
//! and resets the cursor.  Because `enqueue`, `interrupt` and `shutdown` all
//! take `&mut self`, each runs as one uninterruptible step with respect to the
//! others.

use std::collections::BTreeMap;
use std::sync::mpsc;

use thiserror::Error;

use super::codec::AudioChunk;

/// Output sample rate requested from the playback device (Hz).
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Cursor value meaning "nothing scheduled".
pub const UNSET_CURSOR: f64 = 0.0;

/// Identifies one scheduled segment for the lifetime of a scheduler.
pub type SegmentId = u64;

/// Hook fired by the device when a segment finishes playing on its own.
pub type CompletionHook = Box<dyn FnOnce(SegmentId) + Send + 'static>;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    /// Zero-length or otherwise unplayable chunk.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("playback device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The scheduler has been shut down.
    #[error("playback device is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// ScheduledSegment
// ---------------------------------------------------------------------------

/// One chunk bound to a start time on the device clock.
///
/// Ownership passes to the [`PlaybackDevice`], which calls
/// [`complete`](Self::complete) when the segment plays out naturally, or
/// simply drops it when told to [`stop`](PlaybackDevice::stop).
pub struct ScheduledSegment {
    pub id: SegmentId,
    pub chunk: AudioChunk,
    /// Start time on the device clock, in seconds.
    pub start_at: f64,
    on_complete: Option<CompletionHook>,
}

impl ScheduledSegment {
    pub fn new(id: SegmentId, chunk: AudioChunk, start_at: f64, on_complete: CompletionHook) -> Self {
        Self {
            id,
            chunk,
            start_at,
            on_complete: Some(on_complete),
        }
    }

    /// End time on the device clock, in seconds.
    pub fn end_at(&self) -> f64 {
        self.start_at + self.chunk.duration_secs()
    }

    /// Consume the segment, firing its completion hook.
    pub fn complete(mut self) {
        if let Some(hook) = self.on_complete.take() {
            hook(self.id);
        }
    }
}

impl std::fmt::Debug for ScheduledSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledSegment")
            .field("id", &self.id)
            .field("start_at", &self.start_at)
            .field("end_at", &self.end_at())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PlaybackDevice
// ---------------------------------------------------------------------------

/// An opened playback device context.
pub trait PlaybackDevice {
    /// Current time on the device clock in seconds.  Monotonic.
    fn now(&self) -> f64;

    /// Take ownership of `segment` and start it at `segment.start_at`.
    fn start(&mut self, segment: ScheduledSegment) -> Result<(), PlaybackError>;

    /// Stop `id` immediately without firing its completion hook.  Unknown
    /// ids are ignored.
    fn stop(&mut self, id: SegmentId);

    /// Release the device context.
    fn close(&mut self);
}

impl<D: PlaybackDevice + ?Sized> PlaybackDevice for Box<D> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn start(&mut self, segment: ScheduledSegment) -> Result<(), PlaybackError> {
        (**self).start(segment)
    }

    fn stop(&mut self, id: SegmentId) {
        (**self).stop(id)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Start and end of a pending segment on the device clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpan {
    pub id: SegmentId,
    pub start_at: f64,
    pub end_at: f64,
}

pub struct PlaybackScheduler<D: PlaybackDevice> {
    device: Option<D>,
    cursor: f64,
    pending: BTreeMap<SegmentId, SegmentSpan>,
    next_id: SegmentId,
    completed_tx: mpsc::Sender<SegmentId>,
    completed_rx: mpsc::Receiver<SegmentId>,
}

impl<D: PlaybackDevice> PlaybackScheduler<D> {
    pub fn new(device: D) -> Self {
        let (completed_tx, completed_rx) = mpsc::channel();
        Self {
            device: Some(device),
            cursor: UNSET_CURSOR,
            pending: BTreeMap::new(),
            next_id: 1,
            completed_tx,
            completed_rx,
        }
    }

    /// Schedule `chunk` at `max(cursor, now)` and advance the cursor past it.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::UnsupportedFormat`] for a zero-length or malformed
    ///   chunk; the cursor is left untouched.
    /// - [`PlaybackError::Closed`] after [`shutdown`](Self::shutdown).
    /// - Whatever the device reports from `start`; the cursor is left
    ///   untouched.
    pub fn enqueue(&mut self, chunk: AudioChunk) -> Result<SegmentSpan, PlaybackError> {
        if !chunk.is_playable() {
            return Err(PlaybackError::UnsupportedFormat(format!(
                "{} samples, {} Hz, {} channel(s)",
                chunk.samples.len(),
                chunk.sample_rate,
                chunk.channels
            )));
        }

        self.reap_completed();

        let device = self.device.as_mut().ok_or(PlaybackError::Closed)?;
        let now = device.now();
        let start_at = self.cursor.max(now);
        let duration = chunk.duration_secs();

        let id = self.next_id;
        let tx = self.completed_tx.clone();
        let hook: CompletionHook = Box::new(move |id| {
            let _ = tx.send(id);
        });

        device.start(ScheduledSegment::new(id, chunk, start_at, hook))?;

        self.next_id += 1;
        let span = SegmentSpan {
            id,
            start_at,
            end_at: start_at + duration,
        };
        self.pending.insert(id, span);
        self.cursor = span.end_at;

        log::trace!(
            "playback: segment {id} at {start_at:.3}s for {duration:.3}s (now {now:.3}s)"
        );
        Ok(span)
    }

    /// Stop every pending segment, clear the pending set and reset the cursor.
    ///
    /// Returns the number of segments that were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.pending.len();
        if let Some(device) = self.device.as_mut() {
            for id in self.pending.keys() {
                device.stop(*id);
            }
        }
        self.pending.clear();
        self.cursor = UNSET_CURSOR;

        // Completions that raced the stop refer to segments we no longer track.
        while self.completed_rx.try_recv().is_ok() {}

        if stopped > 0 {
            log::debug!("playback: interrupted, {stopped} segment(s) stopped");
        }
        stopped
    }

    /// [`interrupt`](Self::interrupt), then release the device.  Idempotent.
    pub fn shutdown(&mut self) {
        self.interrupt();
        if let Some(mut device) = self.device.take() {
            device.close();
            log::debug!("playback: device closed");
        }
    }

    /// Drop segments whose completion hook has fired.
    pub fn reap_completed(&mut self) -> usize {
        let mut reaped = 0;
        while let Ok(id) = self.completed_rx.try_recv() {
            if self.pending.remove(&id).is_some() {
                reaped += 1;
            }
        }
        reaped
    }

    /// Next available start time; [`UNSET_CURSOR`] when nothing is queued.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.device.is_none()
    }

    /// The device, while open.
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }
}

impl<D: PlaybackDevice> Drop for PlaybackScheduler<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// MockPlaybackDevice
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockClock, MockPlaybackDevice};


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono chunk at 24 kHz lasting `secs`.
    fn chunk(secs: f64) -> AudioChunk {
        AudioChunk {
            samples: vec![0.1; (secs * 24_000.0).round() as usize],
            sample_rate: 24_000,
            channels: 1,
        }
    }

    fn scheduler() -> (PlaybackScheduler<MockPlaybackDevice>, MockClock) {
        let clock = MockClock::default();
        (
            PlaybackScheduler::new(MockPlaybackDevice::new(clock.clone())),
            clock,
        )
    }

    const EPS: f64 = 1e-9;

    #[test]
    fn first_chunk_starts_now() {
        let (mut sched, clock) = scheduler();
        clock.advance_to(1.5);

        let span = sched.enqueue(chunk(0.5)).unwrap();
        assert!((span.start_at - 1.5).abs() < EPS);
        assert!((sched.cursor() - 2.0).abs() < EPS);
    }

    #[test]
    fn fast_arrivals_play_back_to_back() {
        let (mut sched, _clock) = scheduler();
        let a = sched.enqueue(chunk(0.5)).unwrap();
        let b = sched.enqueue(chunk(0.25)).unwrap();
        let c = sched.enqueue(chunk(1.0)).unwrap();

        assert!((b.start_at - a.end_at).abs() < EPS);
        assert!((c.start_at - b.end_at).abs() < EPS);
        assert!((sched.cursor() - 1.75).abs() < EPS);
        assert_eq!(sched.pending(), 3);
    }

    #[test]
    fn late_arrival_is_never_scheduled_in_the_past() {
        let (mut sched, clock) = scheduler();
        sched.enqueue(chunk(0.5)).unwrap();

        clock.advance_to(2.0);
        let late = sched.enqueue(chunk(0.5)).unwrap();
        assert!((late.start_at - 2.0).abs() < EPS);
    }

    #[test]
    fn start_times_are_monotonic_for_arbitrary_arrivals() {
        let (mut sched, clock) = scheduler();
        let arrivals = [0.0, 0.1, 0.1, 0.9, 3.0, 3.05, 3.05, 7.5];
        let durations = [0.3, 0.2, 0.5, 0.1, 0.4, 0.4, 0.05, 0.2];

        let mut prev_end = 0.0_f64;
        let mut prev_start = f64::MIN;
        for (t, d) in arrivals.iter().zip(durations) {
            clock.advance_to(*t);
            let span = sched.enqueue(chunk(d)).unwrap();
            assert!(span.start_at >= prev_start);
            assert!(span.start_at + EPS >= prev_end.max(*t));
            prev_start = span.start_at;
            prev_end = span.end_at;
        }
    }

    #[test]
    fn natural_completion_removes_segment() {
        let (mut sched, clock) = scheduler();
        sched.enqueue(chunk(0.5)).unwrap();
        sched.enqueue(chunk(0.5)).unwrap();

        clock.advance_to(0.6);
        assert_eq!(sched.reap_completed(), 1);
        assert_eq!(sched.pending(), 1);
        // Completion does not rewind the cursor.
        assert!((sched.cursor() - 1.0).abs() < EPS);
    }

    #[test]
    fn interrupt_with_nothing_pending() {
        let (mut sched, _clock) = scheduler();
        assert_eq!(sched.interrupt(), 0);
        assert_eq!(sched.cursor(), UNSET_CURSOR);
    }

    #[test]
    fn interrupt_with_one_pending() {
        let (mut sched, clock) = scheduler();
        let span = sched.enqueue(chunk(0.5)).unwrap();

        assert_eq!(sched.interrupt(), 1);
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.cursor(), UNSET_CURSOR);
        assert_eq!(clock.stopped(), vec![span.id]);
        assert_eq!(clock.playing(), 0);
    }

    #[test]
    fn interrupt_with_many_pending() {
        let (mut sched, clock) = scheduler();
        for _ in 0..12 {
            sched.enqueue(chunk(0.1)).unwrap();
        }

        assert_eq!(sched.interrupt(), 12);
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.cursor(), UNSET_CURSOR);
        assert_eq!(clock.playing(), 0);
    }

    #[test]
    fn enqueue_after_interrupt_starts_from_now() {
        let (mut sched, clock) = scheduler();
        for _ in 0..4 {
            sched.enqueue(chunk(1.0)).unwrap();
        }
        clock.advance_to(0.5);
        sched.interrupt();

        let span = sched.enqueue(chunk(0.2)).unwrap();
        assert!((span.start_at - 0.5).abs() < EPS);
    }

    #[test]
    fn zero_length_chunk_is_rejected_without_moving_cursor() {
        let (mut sched, _clock) = scheduler();
        sched.enqueue(chunk(0.5)).unwrap();

        let err = sched.enqueue(chunk(0.0)).unwrap_err();
        assert!(matches!(err, PlaybackError::UnsupportedFormat(_)));
        assert!((sched.cursor() - 0.5).abs() < EPS);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn malformed_chunk_is_rejected() {
        let (mut sched, _clock) = scheduler();
        let bad = AudioChunk {
            samples: vec![0.0; 3],
            sample_rate: 24_000,
            channels: 2,
        };
        assert!(sched.enqueue(bad).is_err());
        assert_eq!(sched.cursor(), UNSET_CURSOR);
    }

    #[test]
    fn shutdown_closes_device_and_rejects_further_chunks() {
        let (mut sched, clock) = scheduler();
        sched.enqueue(chunk(0.5)).unwrap();

        sched.shutdown();
        sched.shutdown();
        assert!(clock.is_closed());
        assert!(sched.is_closed());
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.enqueue(chunk(0.5)).unwrap_err(), PlaybackError::Closed);
    }

    #[test]
    fn stale_completion_after_interrupt_is_ignored() {
        let (mut sched, clock) = scheduler();
        sched.enqueue(chunk(0.1)).unwrap();

        // Completes before the interrupt is processed.
        clock.advance_to(1.0);
        sched.interrupt();

        let span = sched.enqueue(chunk(0.1)).unwrap();
        assert_eq!(sched.reap_completed(), 0);
        assert_eq!(sched.pending(), 1);
        assert!((span.start_at - 1.0).abs() < EPS);
    }
}
