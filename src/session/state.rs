//! Connection state machine states and the shared presentation snapshot.
//!
//! [`ConnectionState`] is the single authoritative lifecycle value.  The
//! presentation layer reads it, together with the log and the active
//! counterparty, through [`SharedState`].
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<BridgeState>>`, cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of the bridge.
///
/// ```text
/// Idle ──connect()──▶ Connecting ──open──▶ Connected
///                                         ──call_counterparty──▶ DialingCounterparty
///                                                                ──3 s──▶ InCallWithCounterparty
/// any state ──close / error / disconnect()──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    /// Device contexts are open and the remote session is being opened.
    Connecting,
    /// The remote session is open and the microphone is streaming.
    Connected,
    /// An outbound call has been placed and is ringing.
    DialingCounterparty,
    /// The ringing delay elapsed; the counterparty is on the line.
    InCallWithCounterparty,
}

impl ConnectionState {
    /// Returns `true` while a remote session is open.
    ///
    /// ```
    /// use voice_concierge::session::ConnectionState;
    ///
    /// assert!(!ConnectionState::Idle.is_live());
    /// assert!(!ConnectionState::Connecting.is_live());
    /// assert!(ConnectionState::Connected.is_live());
    /// assert!(ConnectionState::DialingCounterparty.is_live());
    /// ```
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::DialingCounterparty
                | ConnectionState::InCallWithCounterparty
        )
    }

    /// Returns `true` while an outbound call is ringing or connected.
    pub fn is_on_call(&self) -> bool {
        matches!(
            self,
            ConnectionState::DialingCounterparty | ConnectionState::InCallWithCounterparty
        )
    }

    /// A short human-readable label for a status bar.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::DialingCounterparty => "Dialing",
            ConnectionState::InCallWithCounterparty => "In call",
        }
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// Who a log line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    System,
}

/// One line of the conversation log.  Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub sender: Sender,
    pub message: String,
}

impl LogEntry {
    pub fn new(sender: Sender, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            sender,
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(Sender::System, message)
    }
}

// ---------------------------------------------------------------------------
// BridgeState
// ---------------------------------------------------------------------------

/// Everything the presentation layer renders.  Cloning it yields a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeState {
    pub connection: ConnectionState,
    /// Append-only, in arrival order.
    pub log: Vec<LogEntry>,
    /// Name of the counterparty being dialed or on the line.
    pub counterparty: Option<String>,
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }

    /// Messages of every system entry, oldest first.
    pub fn system_messages(&self) -> Vec<&str> {
        self.log
            .iter()
            .filter(|e| e.sender == Sender::System)
            .map(|e| e.message.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`BridgeState`].
///
/// Lock with [`lock_state`] for a short critical section; do **not** hold the
/// lock across `.await` points.
pub type SharedState = Arc<Mutex<BridgeState>>;

/// Construct a new [`SharedState`] wrapping an idle [`BridgeState`].
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(BridgeState::new()))
}

/// Lock `state`, recovering the data if a previous holder panicked.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, BridgeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_connection_state_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn on_call_states() {
        assert!(!ConnectionState::Connected.is_on_call());
        assert!(ConnectionState::DialingCounterparty.is_on_call());
        assert!(ConnectionState::InCallWithCounterparty.is_on_call());
        assert!(ConnectionState::InCallWithCounterparty.is_live());
    }

    #[test]
    fn labels() {
        assert_eq!(ConnectionState::Idle.label(), "Idle");
        assert_eq!(ConnectionState::DialingCounterparty.label(), "Dialing");
        assert_eq!(ConnectionState::InCallWithCounterparty.label(), "In call");
    }

    #[test]
    fn sender_serializes_lowercase() {
        let json = serde_json::to_string(&Sender::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn system_messages_filters_by_sender() {
        let mut st = BridgeState::new();
        st.push_log(LogEntry::system("one"));
        st.push_log(LogEntry::new(Sender::User, "hello"));
        st.push_log(LogEntry::system("two"));
        assert_eq!(st.system_messages(), vec!["one", "two"]);
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state();
        let state2 = Arc::clone(&state);

        lock_state(&state).connection = ConnectionState::Connecting;
        assert_eq!(lock_state(&state2).connection, ConnectionState::Connecting);
    }
}
