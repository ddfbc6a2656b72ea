use serde::Deserialize;
use tracing::warn;

use crate::transcript::TranscriptSegment;

/// Inbound result envelope from the recognition service.
///
/// Shape: `{ "channel": { "alternatives": [ { "transcript", "confidence" } ] },
/// "is_final": bool }`. Only the first alternative is consumed; every field
/// defaults so partially formed envelopes still parse.
#[derive(Debug, Default, Deserialize)]
pub struct ResultEnvelope {
    #[serde(default)]
    pub channel: ResultChannel,

    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultChannel {
    #[serde(default)]
    pub alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultAlternative {
    #[serde(default)]
    pub transcript: String,

    #[serde(default)]
    pub confidence: f32,
}

impl ResultEnvelope {
    /// Extract the first alternative as a transcript segment.
    ///
    /// Returns `None` when there is no alternative or the transcript is
    /// empty or whitespace-only; such messages carry nothing displayable.
    pub fn into_segment(mut self) -> Option<TranscriptSegment> {
        if self.channel.alternatives.is_empty() {
            return None;
        }
        let alternative = self.channel.alternatives.swap_remove(0);

        let text = alternative.transcript.trim();
        if text.is_empty() {
            return None;
        }

        Some(TranscriptSegment::new(
            text,
            alternative.confidence,
            self.is_final,
        ))
    }
}

/// Parse one raw result message into a segment.
///
/// Malformed envelopes are logged and skipped; one bad message must not
/// terminate an otherwise-healthy stream.
pub fn parse_result(raw: &str) -> Option<TranscriptSegment> {
    match serde_json::from_str::<ResultEnvelope>(raw) {
        Ok(envelope) => envelope.into_segment(),
        Err(e) => {
            warn!("Ignoring unparseable result message: {}", e);
            None
        }
    }
}
