//! Inbound event types consumed one at a time by the session machine.
//!
//! Hardware callbacks, the transport and the ringing timer never touch the
//! machine directly; they post a [`SessionEvent`] on the machine's channel.
//! Events produced on behalf of a particular remote session carry its
//! [`SessionId`] so that anything arriving after that session was torn down
//! can be recognised and ignored.

use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::tools::ToolCallRequest;

use super::state::Sender;

/// Generation number of one remote session.  Never reused.
pub type SessionId = u64;

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the machine's event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Presentation command.
    Connect,
    /// Presentation command.
    Disconnect,
    /// Tear down and stop the driver loop.
    Shutdown,
    /// Something the transport reported for `session`.
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
    /// One encoded microphone frame captured during `session`.
    Captured { session: SessionId, frame: AudioFrame },
    /// The ringing delay for dial number `dial` elapsed.
    RingingElapsed { dial: u64 },
}

// ---------------------------------------------------------------------------
// TransportEvent / ServerMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(ServerMessage),
    Close,
    Error(String),
}

/// One message from the remote model.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Base64 wrapped `s16le` audio.
    AudioChunk {
        payload: String,
        sample_rate: u32,
        channels: u16,
    },
    ToolCallBatch(Vec<ToolCallRequest>),
    /// The user started speaking over the assistant.
    Interrupted,
    /// The model finished its turn.
    ContentComplete,
    /// Transcription of either side of the conversation.
    Transcript { speaker: Sender, text: String },
}

// ---------------------------------------------------------------------------
// InboundSender
// ---------------------------------------------------------------------------

/// Handed to a transport when a session is opened; tags everything it sends
/// with that session's id.
#[derive(Debug, Clone)]
pub struct InboundSender {
    session: SessionId,
    tx: EventSender,
}

impl InboundSender {
    pub fn new(session: SessionId, tx: EventSender) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Post `event`.  Returns `false` once the machine has gone away.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                session: self.session,
                event,
            })
            .is_ok()
    }

    pub fn open(&self) -> bool {
        self.send(TransportEvent::Open)
    }

    pub fn message(&self, message: ServerMessage) -> bool {
        self.send(TransportEvent::Message(message))
    }

    pub fn close(&self) -> bool {
        self.send(TransportEvent::Close)
    }

    pub fn error(&self, cause: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(cause.into()))
    }
}
