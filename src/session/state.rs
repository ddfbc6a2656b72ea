use serde::{Deserialize, Serialize};

/// Snapshot of session-level status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingState {
    /// Whether recording is currently active
    pub is_recording: bool,

    /// Reserved; no pause transition exists yet
    pub is_paused: bool,

    /// Seconds recorded so far, reset to 0 on each new start
    pub duration_secs: u64,

    /// Human-readable failure from the last attempt, cleared on each new start
    pub error: Option<String>,
}
