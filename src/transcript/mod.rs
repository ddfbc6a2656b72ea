//! Transcript state
//!
//! Incoming interim/final results are merged by `TranscriptAggregator` into
//! an ordered transcript; `export_transcript` writes the finalized portion
//! to a dated plain-text file.

mod aggregator;
mod export;

pub use aggregator::{TranscriptAggregator, TranscriptSegment};
pub use export::export_transcript;
