pub mod audio;
pub mod channel;
pub mod config;
pub mod session;
pub mod transcript;

pub use audio::{
    encode_block, BlockAssembler, CaptureConstraints, CaptureError, CaptureSource,
    MicrophoneSource, BLOCK_SAMPLES,
};
pub use channel::{
    parse_result, ChannelConfig, ChannelError, ChannelEvent, ChannelHandle, ChannelState,
    DeepgramConnector, Outbound, TranscriptionConnector, NORMAL_CLOSURE,
};
pub use config::{Config, Credential};
pub use session::{RecordingState, SessionController, SessionError};
pub use transcript::{export_transcript, TranscriptAggregator, TranscriptSegment};
