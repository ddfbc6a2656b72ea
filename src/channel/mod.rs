//! Streaming connection to the recognition service
//!
//! `ChannelConfig` describes one connection; `TranscriptionConnector` opens
//! it and hands back a `ChannelHandle` for outbound audio plus an event
//! receiver for inbound results. `DeepgramConnector` is the real WebSocket
//! implementation.

mod channel;
mod config;
mod deepgram;
mod messages;

pub use channel::{
    ChannelError, ChannelEvent, ChannelHandle, ChannelState, Outbound, SharedChannelState,
    TranscriptionConnector, NORMAL_CLOSURE,
};
pub use config::ChannelConfig;
pub use deepgram::DeepgramConnector;
pub use messages::{parse_result, ResultAlternative, ResultChannel, ResultEnvelope};
