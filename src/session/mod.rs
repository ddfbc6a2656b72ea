//! Recording session management
//!
//! `SessionController` coordinates one live session: microphone capture,
//! PCM encoding, the transcription channel, transcript aggregation, the
//! duration tick, and error surfacing.

mod controller;
mod error;
mod state;

pub use controller::SessionController;
pub use error::SessionError;
pub use state::RecordingState;
