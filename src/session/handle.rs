//! Presentation-facing handle: two commands plus a read-only snapshot.

use crate::audio::{AudioBackend, CpalBackend};
use crate::config::BridgeConfig;

use super::events::{event_channel, EventReceiver, EventSender, SessionEvent};
use super::machine::SessionMachine;
use super::state::{lock_state, new_shared_state, BridgeState, SharedState};
use super::transport::LiveConnector;

/// Cheap to clone; safe to use from any thread.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    events: EventSender,
    state: SharedState,
}

impl BridgeHandle {
    pub fn new(events: EventSender, state: SharedState) -> Self {
        Self { events, state }
    }

    /// Ask the machine to connect.  Returns `false` once the machine is gone.
    pub fn connect(&self) -> bool {
        self.send(SessionEvent::Connect)
    }

    pub fn disconnect(&self) -> bool {
        self.send(SessionEvent::Disconnect)
    }

    /// Tear down and stop the machine's driver loop.
    pub fn shutdown(&self) -> bool {
        self.send(SessionEvent::Shutdown)
    }

    /// Copy of the current state, connection and log included.
    pub fn snapshot(&self) -> BridgeState {
        lock_state(&self.state).clone()
    }

    fn send(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Build a machine over `backend`, configured from `config`, plus its handle
/// and the receiver to pass to [`SessionMachine::run`].
///
/// ```rust,ignore
/// let (handle, machine, events) = bridge(connector, backend, &config);
/// let local = tokio::task::LocalSet::new();
/// local.spawn_local(machine.run(events));
/// handle.connect();
/// ```
pub fn bridge<C, B>(
    connector: C,
    backend: B,
    config: &BridgeConfig,
) -> (BridgeHandle, SessionMachine<C, B>, EventReceiver)
where
    C: LiveConnector,
    B: AudioBackend,
{
    let (tx, rx) = event_channel();
    let state = new_shared_state();
    let machine = SessionMachine::new(state.clone(), connector, backend, tx.clone())
        .with_settings(config.session.clone());
    (BridgeHandle::new(tx, state), machine, rx)
}

/// [`bridge`] over the system's `cpal` audio devices.
pub fn cpal_bridge<C: LiveConnector>(
    connector: C,
    config: &BridgeConfig,
) -> (BridgeHandle, SessionMachine<C, CpalBackend>, EventReceiver) {
    bridge(connector, CpalBackend::new(config.audio.clone()), config)
}
