use thiserror::Error;

use crate::audio::CaptureError;
use crate::channel::ChannelError;

/// Session-fatal failures.
///
/// All of these are reported, never retried automatically: each surfaces a
/// single human-readable message into session state and leaves the session
/// not recording. The user retries via `start()`.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("No API credential configured. Set LIVESCRIBE_API_KEY (or DEEPGRAM_API_KEY) and try again.")]
    MissingCredential,

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Connection error: {0}. Check your API key and network, then try again.")]
    Connection(String),

    #[error("Connection closed unexpectedly (code {code}): {reason}")]
    AbnormalClose { code: u16, reason: String },
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied(message) => SessionError::PermissionDenied(message),
            CaptureError::DeviceUnavailable(message) => SessionError::DeviceUnavailable(message),
        }
    }
}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        SessionError::Connection(e.to_string())
    }
}
