pub mod capture;
pub mod pcm;

pub use capture::{CaptureConstraints, CaptureError, CaptureSource, MicrophoneSource};
pub use pcm::{encode_block, BlockAssembler, BLOCK_SAMPLES};
