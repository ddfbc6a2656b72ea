use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recognized utterance fragment from the STT service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text (non-empty, trimmed)
    pub text: String,

    /// When this segment was received
    pub timestamp: DateTime<Utc>,

    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,

    /// Whether the service has committed to this segment. Interim segments
    /// (false) may still be revised by a later message.
    pub is_final: bool,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            confidence,
            is_final,
        }
    }
}

/// Merges interim and final results into an ordered transcript.
///
/// Finalized segments are append-only: once committed they are never mutated
/// or removed except by `clear`. Interim results replace each other: the
/// service revises its current guess rather than adding to it, so only the
/// latest interim segment is retained, and a final segment supersedes the
/// interim slot entirely.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    finalized: Vec<TranscriptSegment>,
    interim: Option<TranscriptSegment>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one incoming segment into the transcript.
    pub fn apply(&mut self, segment: TranscriptSegment) {
        if segment.is_final {
            self.interim = None;
            self.finalized.push(segment);
        } else {
            self.interim = Some(segment);
        }
    }

    /// All finalized text, joined with single spaces in arrival order.
    pub fn final_text(&self) -> String {
        self.finalized
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The current interim guess, or empty when there is none.
    pub fn interim_text(&self) -> String {
        self.interim
            .as_ref()
            .map(|s| s.text.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the displayable transcript: finalized segments in order,
    /// followed by the trailing interim segment if present.
    pub fn segments(&self) -> Vec<TranscriptSegment> {
        let mut all = self.finalized.clone();
        if let Some(interim) = &self.interim {
            all.push(interim.clone());
        }
        all
    }

    /// Number of finalized segments.
    pub fn finalized_count(&self) -> usize {
        self.finalized.len()
    }

    /// Empty the transcript entirely.
    pub fn clear(&mut self) {
        self.finalized.clear();
        self.interim = None;
    }

    pub fn is_empty(&self) -> bool {
        self.finalized.is_empty() && self.interim.is_none()
    }
}
