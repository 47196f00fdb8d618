//! The seam to the remote conversational model.
//!
//! A [`LiveConnector`] opens one [`LiveSession`] per connection attempt and
//! reports everything that happens afterwards (open, messages, close, error)
//! through the [`InboundSender`] it was given.  Both send operations are
//! fire-and-forget from the machine's point of view.

use thiserror::Error;

use crate::audio::AudioFrame;
use crate::config::VoiceProfile;
use crate::tools::{ToolCallResult, ToolDeclaration};

use super::events::InboundSender;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("failed to open session: {0}")]
    Open(String),

    #[error("failed to send: {0}")]
    Send(String),

    #[error("session is closed")]
    Closed,
}

/// What the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    AudioOnly,
}

/// Parameters of one remote session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    pub api_key: String,
    pub system_preamble: String,
    pub tools: Vec<ToolDeclaration>,
    pub output: OutputFormat,
    pub voice: VoiceProfile,
}

/// Opens remote sessions.
pub trait LiveConnector {
    fn open(
        &mut self,
        config: SessionConfig,
        inbound: InboundSender,
    ) -> Result<Box<dyn LiveSession>, TransportError>;
}

/// An open remote session.
pub trait LiveSession {
    fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), TransportError>;

    fn send_tool_results(&mut self, results: Vec<ToolCallResult>) -> Result<(), TransportError>;

    /// Best-effort close.  Transports without a close primitive leave this
    /// as a no-op; local resources are released regardless.
    fn close(&mut self) {}
}

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockConnector;
