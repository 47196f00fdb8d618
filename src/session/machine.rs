//! Session state machine: coordinates capture, playback, the remote session
//! and the tool executor.
//!
//! [`SessionMachine`] owns every hardware and network handle of the one
//! active session and is the only writer of [`SharedState`].  Everything
//! that happens elsewhere (transport callbacks, captured frames, the ringing
//! timer) arrives as a [`SessionEvent`] and is applied by
//! [`handle`](SessionMachine::handle), one event at a time, in arrival order.
//!
//! # Flow
//!
//! ```text
//! connect()
//!   └─▶ credential check → open capture (16 kHz) + playback (24 kHz)
//!         → LiveConnector::open                              [Connecting]
//! Transport(Open)
//!   └─▶ acquire microphone → frames flow as Captured events  [Connected]
//! Message(AudioChunk)    → decode → PlaybackScheduler::enqueue
//! Message(ToolCallBatch) → ToolExecutor per call → one batched reply
//!   └─ call_counterparty → ringing timer (3 s)               [DialingCounterparty]
//!        RingingElapsed                                      [InCallWithCounterparty]
//! Message(Interrupted)   → PlaybackScheduler::interrupt
//! Transport(Close|Error) / disconnect()
//!   └─▶ cancel timer, stop capture, shut down playback        [Idle]
//! ```
//!
//! `cpal` streams are not `Send`, so the machine runs on the thread that
//! created it: drive [`run`](SessionMachine::run) with `block_on` or inside a
//! `tokio::task::LocalSet`.  Dialing spawns the ringing timer with
//! `tokio::spawn`, so a Tokio runtime must be current whenever
//! [`handle`](SessionMachine::handle) runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::audio::{
    decode_payload, AudioBackend, AudioFrame, CaptureDevice, CapturePipeline, PlaybackScheduler,
    CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE,
};
use crate::config::{CredentialSource, SessionSettings};
use crate::tools::{
    default_declarations, LineStatus, PlaceDirectory, StaticDirectory, ToolCallRequest,
    ToolEffect, ToolExecutor,
};

use super::error::BridgeError;
use super::events::{
    EventReceiver, EventSender, InboundSender, ServerMessage, SessionEvent, SessionId,
    TransportEvent,
};
use super::preamble::SYSTEM_PREAMBLE;
use super::state::{lock_state, BridgeState, ConnectionState, LogEntry, SharedState};
use super::transport::{LiveConnector, LiveSession, OutputFormat, SessionConfig};

/// Simulated ringing time before a dialed counterparty picks up.
pub const RINGING_DELAY: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Owned resources
// ---------------------------------------------------------------------------

/// Handles of the one live session.  Dropped together on teardown.
struct ActiveSession<B: AudioBackend> {
    id: SessionId,
    remote: Box<dyn LiveSession>,
    capture_device: B::Capture,
    capture: CapturePipeline,
    playback: PlaybackScheduler<B::Playback>,
}

struct Ringing {
    dial: u64,
    task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// SessionMachine
// ---------------------------------------------------------------------------

pub struct SessionMachine<C: LiveConnector, B: AudioBackend> {
    state: SharedState,
    connector: C,
    backend: B,
    settings: SessionSettings,
    credentials: CredentialSource,
    executor: ToolExecutor,
    /// Loopback into the machine's own channel (captured frames, timers,
    /// transport events).
    events: EventSender,
    last_session: SessionId,
    active: Option<ActiveSession<B>>,
    last_dial: u64,
    ringing: Option<Ringing>,
}

impl<C: LiveConnector, B: AudioBackend> SessionMachine<C, B> {
    /// Create an idle machine.
    ///
    /// # Arguments
    ///
    /// * `state` is the snapshot shared with the presentation layer.
    /// * `connector` opens remote sessions.
    /// * `backend` opens the capture and playback device contexts.
    /// * `events` is the sender half of the channel later passed to
    ///   [`run`](Self::run).
    pub fn new(state: SharedState, connector: C, backend: B, events: EventSender) -> Self {
        let settings = SessionSettings::default();
        Self {
            state,
            connector,
            backend,
            credentials: settings.credentials(),
            settings,
            executor: ToolExecutor::new(Arc::new(StaticDirectory::sample())),
            events,
            last_session: 0,
            active: None,
            last_dial: 0,
            ringing: None,
        }
    }

    /// Use `settings`; the credential source follows `settings.api_key_env`.
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.credentials = settings.credentials();
        self.settings = settings;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn PlaceDirectory>) -> Self {
        self.executor = ToolExecutor::new(directory);
        self
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn connection(&self) -> ConnectionState {
        lock_state(&self.state).connection
    }

    pub fn snapshot(&self) -> BridgeState {
        lock_state(&self.state).clone()
    }

    /// Id of the live session, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Returns `true` while a ringing timer is pending.
    pub fn is_ringing(&self) -> bool {
        self.ringing.is_some()
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Apply events from `events` until [`SessionEvent::Shutdown`].
    ///
    /// The machine holds a sender of its own, so the channel never closes
    /// while it runs; `Shutdown` is the way out.
    pub async fn run(mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            let stop = matches!(event, SessionEvent::Shutdown);
            self.handle(event);
            if stop {
                break;
            }
        }
        log::info!("session: driver loop finished");
    }

    /// Apply one event.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connect => {
                if let Err(e) = self.connect() {
                    log::debug!("session: connect request failed: {e}");
                }
            }
            SessionEvent::Disconnect => self.disconnect(),
            SessionEvent::Shutdown => {
                if self.active.is_some() {
                    self.disconnect();
                }
            }
            SessionEvent::Transport { session, event } => self.on_transport(session, event),
            SessionEvent::Captured { session, frame } => self.on_captured(session, &frame),
            SessionEvent::RingingElapsed { dial } => self.on_ringing_elapsed(dial),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start a new session.
    ///
    /// No-op while a session is connecting or live.  The microphone is not
    /// touched until the remote side reports the session open.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::Configuration`] when no credential is configured; the
    ///   state does not change.
    /// * Device or transport errors while opening; the machine is back in
    ///   `Idle` with everything released.
    pub fn connect(&mut self) -> Result<(), BridgeError> {
        let current = self.connection();
        if matches!(
            current,
            ConnectionState::Connecting | ConnectionState::Connected
        ) || self.active.is_some()
        {
            log::debug!("session: connect ignored while {}", current.label());
            return Ok(());
        }

        let Some(api_key) = self.credentials.resolve() else {
            let err = BridgeError::Configuration(format!(
                "API key not found in {}",
                self.credentials.describe()
            ));
            log::warn!("session: {err}");
            self.log_system(err.to_string());
            return Err(err);
        };

        self.set_connection(ConnectionState::Connecting);
        self.log_system("Initializing audio and connecting...");
        log::info!(
            "session: connecting (model {}, voice {})",
            self.settings.model,
            self.settings.voice.name()
        );

        match self.open_session(api_key) {
            Ok(active) => {
                log::debug!("session: session {} opened, awaiting remote", active.id);
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                log::error!("session: failed to connect: {e}");
                self.log_system(format!("Failed to connect: {e}"));
                self.teardown();
                Err(e)
            }
        }
    }

    /// Release everything and return to `Idle`.  Safe from any state.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.log_system("Disconnected");
        log::info!("session: disconnected");
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    fn open_session(&mut self, api_key: String) -> Result<ActiveSession<B>, BridgeError> {
        self.last_session += 1;
        let id = self.last_session;

        let mut capture_device = self.backend.open_capture(CAPTURE_SAMPLE_RATE)?;
        let playback = match self.backend.open_playback(PLAYBACK_SAMPLE_RATE) {
            Ok(device) => PlaybackScheduler::new(device),
            Err(e) => {
                capture_device.close();
                return Err(e.into());
            }
        };

        let config = SessionConfig {
            model: self.settings.model.clone(),
            api_key,
            system_preamble: SYSTEM_PREAMBLE.to_owned(),
            tools: default_declarations(),
            output: OutputFormat::AudioOnly,
            voice: self.settings.voice,
        };
        let remote = match self
            .connector
            .open(config, InboundSender::new(id, self.events.clone()))
        {
            Ok(remote) => remote,
            Err(e) => {
                capture_device.close();
                return Err(e.into());
            }
        };

        Ok(ActiveSession {
            id,
            remote,
            capture_device,
            capture: CapturePipeline::new(),
            playback,
        })
    }

    /// Cancel the ringing timer and release every handle of the live session.
    fn teardown(&mut self) {
        self.cancel_ringing();

        if let Some(mut active) = self.active.take() {
            active.capture.stop();
            active.capture_device.close();
            active.playback.shutdown();
            active.remote.close();
            log::debug!("session: session {} released", active.id);
        }

        let mut st = lock_state(&self.state);
        st.connection = ConnectionState::Idle;
        st.counterparty = None;
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    fn on_transport(&mut self, session: SessionId, event: TransportEvent) {
        if self.session_id() != Some(session) {
            log::debug!("session: ignoring {event:?} from stale session {session}");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(message) => self.on_message(message),
            TransportEvent::Close => {
                log::info!("session: connection closed by remote");
                self.log_system("Connection closed.");
                self.teardown();
            }
            TransportEvent::Error(cause) => {
                log::error!("session: transport error: {cause}");
                self.log_system(format!("Connection error occurred: {cause}"));
                self.teardown();
            }
        }
    }

    fn on_open(&mut self) {
        if self.connection() != ConnectionState::Connecting {
            log::debug!("session: duplicate open ignored");
            return;
        }
        self.set_connection(ConnectionState::Connected);
        self.log_system("Connected to the live session.");
        log::info!("session: connected");

        let tx = self.events.clone();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let id = active.id;
        let started = active
            .capture
            .start(&mut active.capture_device, move |frame| {
                // Fails only once the machine is gone; the frame is dropped.
                let _ = tx.send(SessionEvent::Captured { session: id, frame });
            });

        if let Err(e) = started {
            let err = BridgeError::from(e);
            log::error!("session: microphone: {err}");
            self.log_system(format!("Error accessing microphone: {err}"));
            self.disconnect();
        }
    }

    fn on_captured(&mut self, session: SessionId, frame: &AudioFrame) {
        let live = self.connection().is_live();
        match self.active.as_mut() {
            Some(active) if active.id == session && live => {
                if let Err(e) = active.remote.send_audio(frame) {
                    log::debug!("session: outbound frame dropped: {e}");
                }
            }
            _ => log::trace!("session: frame from inactive session {session} dropped"),
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::AudioChunk {
                payload,
                sample_rate,
                channels,
            } => self.play_chunk(&payload, sample_rate, channels),
            ServerMessage::ToolCallBatch(calls) => self.run_tools(calls),
            ServerMessage::Interrupted => {
                self.log_system("Assistant was interrupted.");
                if let Some(active) = self.active.as_mut() {
                    let stopped = active.playback.interrupt();
                    log::debug!("session: interrupted, {stopped} segment(s) flushed");
                }
            }
            ServerMessage::ContentComplete => {
                if let Some(active) = self.active.as_mut() {
                    active.playback.reap_completed();
                }
                log::debug!("session: model turn complete");
            }
            ServerMessage::Transcript { speaker, text } => {
                if !text.trim().is_empty() {
                    lock_state(&self.state).push_log(LogEntry::new(speaker, text));
                }
            }
        }
    }

    fn play_chunk(&mut self, payload: &str, sample_rate: u32, channels: u16) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let scheduled = decode_payload(payload, sample_rate, channels)
            .map_err(BridgeError::from)
            .and_then(|chunk| active.playback.enqueue(chunk).map_err(BridgeError::from));

        match scheduled {
            Err(e) if e.is_connection_level() => {
                log::error!("session: playback failed: {e}");
                self.log_system(format!("Playback failed: {e}"));
                self.disconnect();
            }
            Err(e) => {
                log::warn!("session: audio chunk dropped: {e}");
                self.log_system(format!("Dropped audio chunk: {e}"));
            }
            Ok(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Tools
    // -----------------------------------------------------------------------

    /// Execute every call in order and reply with one batch.
    ///
    /// A dial is honoured only from `Connected`; once a call is ringing or
    /// connected, further dials in this or later batches answer "busy".
    fn run_tools(&mut self, calls: Vec<ToolCallRequest>) {
        let mut results = Vec::with_capacity(calls.len());

        for call in &calls {
            log::info!("session: executing tool {} ({})", call.name, call.id);
            self.log_system(format!("Executing tool: {}", call.name));

            let current = self.connection();
            let line = if current.is_live() && !current.is_on_call() {
                LineStatus::Free
            } else {
                LineStatus::Busy
            };
            let outcome = self.executor.execute(call, line);
            for note in outcome.notes {
                self.log_system(note);
            }
            if let Some(ToolEffect::Dial { name }) = outcome.effect {
                self.start_dialing(name);
            }
            results.push(outcome.result);
        }

        if let Some(active) = self.active.as_mut() {
            if let Err(e) = active.remote.send_tool_results(results) {
                log::warn!("session: tool results not sent: {e}");
                lock_state(&self.state)
                    .push_log(LogEntry::system(format!("Tool results not sent: {e}")));
            }
        }
    }

    fn start_dialing(&mut self, name: String) {
        self.cancel_ringing();
        self.last_dial += 1;
        let dial = self.last_dial;

        {
            let mut st = lock_state(&self.state);
            st.connection = ConnectionState::DialingCounterparty;
            st.counterparty = Some(name.clone());
            st.push_log(LogEntry::system(format!("Calling {name}...")));
        }
        log::info!("session: dialing {name}");

        let tx = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(RINGING_DELAY).await;
            let _ = tx.send(SessionEvent::RingingElapsed { dial });
        });
        self.ringing = Some(Ringing { dial, task });
    }

    fn on_ringing_elapsed(&mut self, dial: u64) {
        let current = self.ringing.as_ref().is_some_and(|r| r.dial == dial)
            && self.connection() == ConnectionState::DialingCounterparty;
        if !current {
            log::debug!("session: stale ringing timer {dial} ignored");
            return;
        }
        self.ringing = None;

        let mut st = lock_state(&self.state);
        st.connection = ConnectionState::InCallWithCounterparty;
        let name = st.counterparty.clone().unwrap_or_default();
        st.push_log(LogEntry::system(format!("Call connected to {name}")));
        log::info!("session: call connected to {name}");
    }

    fn cancel_ringing(&mut self) {
        if let Some(ringing) = self.ringing.take() {
            ringing.task.abort();
            log::debug!("session: ringing timer {} cancelled", ringing.dial);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_connection(&self, connection: ConnectionState) {
        let mut st = lock_state(&self.state);
        log::debug!("session: {} -> {}", st.connection.label(), connection.label());
        st.connection = connection;
    }

    fn log_system(&self, message: impl Into<String>) {
        lock_state(&self.state).push_log(LogEntry::system(message));
    }
}

impl<C: LiveConnector, B: AudioBackend> Drop for SessionMachine<C, B> {
    fn drop(&mut self) {
        self.cancel_ringing();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
