use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::config::ChannelConfig;
use crate::config::Credential;
use crate::transcript::TranscriptSegment;

/// WebSocket normal-closure status code. Anything else on close is abnormal.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Connection lifecycle: `Idle → Connecting → Open → Closing → Closed`, with
/// `Errored` absorbing from `Connecting` or `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

/// Inbound events surfaced to the session while the channel lives.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A recognized (interim or final) transcript fragment
    Segment(TranscriptSegment),

    /// The connection closed; `code != NORMAL_CLOSURE` is abnormal
    Closed { code: u16, reason: String },

    /// A transport-level failure; terminal for the session
    Error(String),
}

/// Failures establishing a connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid endpoint URL: {0}")]
    BadEndpoint(String),

    #[error("Failed to connect to recognition service: {0}")]
    Connect(String),
}

/// Commands consumed by a connector's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// One encoded audio frame, sent as a binary message
    Audio(Vec<u8>),
    /// Send a normal-closure frame and stop writing
    Close,
}

/// Shared view of a channel's lifecycle state.
pub type SharedChannelState = Arc<Mutex<ChannelState>>;

/// Connector for a streaming recognition service.
///
/// A successful return means the handshake completed and the channel is
/// `Open`; there is no separate ready event to wait for. Implemented by
/// `DeepgramConnector` for the real service and by test doubles feeding
/// synthetic events.
#[async_trait]
pub trait TranscriptionConnector: Send + Sync {
    async fn connect(
        &self,
        config: &ChannelConfig,
        credential: &Credential,
    ) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), ChannelError>;
}

/// Handle to an open transcription stream.
///
/// Cloneable; all clones share the same lifecycle state and outbound queue.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    state: SharedChannelState,
    outbound: mpsc::Sender<Outbound>,
}

impl ChannelHandle {
    /// Build a handle over raw parts. Connectors (including test doubles)
    /// construct one of these after their handshake succeeds.
    pub fn from_parts(state: SharedChannelState, outbound: mpsc::Sender<Outbound>) -> Self {
        Self { state, outbound }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }

    /// Send one encoded audio frame.
    ///
    /// Valid only while `Open`. In any other state the frame is silently
    /// dropped: late-arriving audio during teardown must not crash or
    /// queue. A full outbound queue drops too; the pipeline carries no
    /// backpressure.
    pub fn send(&self, frame: Vec<u8>) {
        if self.state() != ChannelState::Open {
            trace!("Dropping {} byte frame, channel not open", frame.len());
            return;
        }

        if self.outbound.try_send(Outbound::Audio(frame)).is_err() {
            debug!("Dropping audio frame, outbound queue full or closed");
        }
    }

    /// Begin a graceful close with a normal-closure code. Idempotent; a
    /// channel that is already closing, closed, or errored is left alone.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                ChannelState::Open | ChannelState::Connecting => {
                    *state = ChannelState::Closing;
                }
                _ => return,
            }
        }

        if self.outbound.try_send(Outbound::Close).is_err() {
            // Writer already gone; nothing left to close.
            debug!("Close requested but writer has already exited");
        }
    }
}
