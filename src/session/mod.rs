//! Session module: the bridge's lifecycle state machine and everything it
//! talks to.
//!
//! # Architecture
//!
//! ```text
//! BridgeHandle ──Connect/Disconnect/Shutdown──┐
//! LiveConnector callbacks ──Transport{..}─────┤
//! cpal capture thread ──Captured{..}──────────┼─▶ mpsc ─▶ SessionMachine::run()
//! ringing timer ──RingingElapsed{..}──────────┘                 │
//!                                                               ├─▶ PlaybackScheduler
//!                                                               ├─▶ ToolExecutor
//!                                                               └─▶ LiveSession (audio, tool results)
//!
//! SharedState (Arc<Mutex<BridgeState>>) ◀── read by the presentation layer
//! ```

pub mod error;
pub mod events;
pub mod handle;
pub mod machine;
pub mod preamble;
pub mod state;
pub mod transport;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use error::BridgeError;
pub use events::{
    event_channel, EventReceiver, EventSender, InboundSender, ServerMessage, SessionEvent,
    SessionId, TransportEvent,
};
pub use handle::{bridge, cpal_bridge, BridgeHandle};
pub use machine::{SessionMachine, RINGING_DELAY};
pub use preamble::SYSTEM_PREAMBLE;
pub use state::{
    lock_state, new_shared_state, BridgeState, ConnectionState, LogEntry, Sender, SharedState,
};
pub use transport::{
    LiveConnector, LiveSession, OutputFormat, SessionConfig, TransportError,
};

#[cfg(test)]
pub use transport::MockConnector;
