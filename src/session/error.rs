//! Bridge-level error taxonomy.
//!
//! Module errors convert into [`BridgeError`] so the machine can report any
//! failure the same way: a system log entry plus a `log` record.

use thiserror::Error;

use crate::audio::{CaptureError, CodecError, PlaybackError};
use crate::tools::ToolError;

use super::transport::TransportError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required setting (the API credential) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("tool execution fault: {0}")]
    ToolExecution(#[from] ToolError),
}

impl BridgeError {
    /// Returns `true` for errors that end the session.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            BridgeError::PermissionDenied(_)
                | BridgeError::DeviceUnavailable(_)
                | BridgeError::Transport(_)
        )
    }
}

impl From<CaptureError> for BridgeError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied(msg) => BridgeError::PermissionDenied(msg),
            CaptureError::DeviceUnavailable(msg) => BridgeError::DeviceUnavailable(msg),
            other => BridgeError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<PlaybackError> for BridgeError {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::UnsupportedFormat(msg) => BridgeError::UnsupportedFormat(msg),
            PlaybackError::DeviceUnavailable(msg) => BridgeError::DeviceUnavailable(msg),
            PlaybackError::Closed => BridgeError::DeviceUnavailable("playback device is closed".into()),
        }
    }
}

impl From<CodecError> for BridgeError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::MalformedPayload(msg) => BridgeError::MalformedPayload(msg),
            CodecError::UnsupportedFormat(msg) => BridgeError::UnsupportedFormat(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_errors_map_onto_taxonomy() {
        let e: BridgeError = CaptureError::PermissionDenied("user said no".into()).into();
        assert!(matches!(e, BridgeError::PermissionDenied(ref m) if m == "user said no"));

        let e: BridgeError = CaptureError::AlreadyRunning.into();
        assert!(matches!(e, BridgeError::DeviceUnavailable(_)));
        assert!(e.is_connection_level());
    }

    #[test]
    fn codec_errors_are_not_connection_level() {
        let e: BridgeError = CodecError::MalformedPayload("bad".into()).into();
        assert!(matches!(e, BridgeError::MalformedPayload(_)));
        assert!(!e.is_connection_level());

        let e: BridgeError = PlaybackError::UnsupportedFormat("empty".into()).into();
        assert!(matches!(e, BridgeError::UnsupportedFormat(_)));
    }

    #[test]
    fn transport_error_display_is_transparent() {
        let e: BridgeError = TransportError::Open("refused".into()).into();
        assert_eq!(e.to_string(), "failed to open session: refused");
    }
}
