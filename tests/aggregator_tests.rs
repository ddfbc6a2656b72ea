// Unit tests for transcript aggregation: append-only finals, single interim
// slot, join/clear behavior.

use livescribe::{TranscriptAggregator, TranscriptSegment};

fn final_segment(text: &str) -> TranscriptSegment {
    TranscriptSegment::new(text, 0.95, true)
}

fn interim_segment(text: &str, confidence: f32) -> TranscriptSegment {
    TranscriptSegment::new(text, confidence, false)
}

#[test]
fn test_finalized_segments_join_with_single_spaces() {
    let mut aggregator = TranscriptAggregator::new();

    aggregator.apply(final_segment("hello"));
    aggregator.apply(final_segment("world"));

    assert_eq!(aggregator.final_text(), "hello world");
    assert_eq!(aggregator.finalized_count(), 2);
}

#[test]
fn interim_results_replace_previous_interim() {
    // Deliberate behavior change from the naive append-everything merge: a
    // new interim result supersedes the previous one instead of
    // accumulating, so a long session cannot leak stale interim fragments.
    let mut aggregator = TranscriptAggregator::new();

    aggregator.apply(interim_segment("tes", 0.3));
    aggregator.apply(interim_segment("testing", 0.5));
    aggregator.apply(interim_segment("testing one", 0.7));

    assert_eq!(aggregator.interim_text(), "testing one");
    assert_eq!(aggregator.final_text(), "");
    assert_eq!(aggregator.segments().len(), 1);
}

#[test]
fn test_final_segment_clears_interim_slot() {
    let mut aggregator = TranscriptAggregator::new();

    aggregator.apply(interim_segment("testing one", 0.6));
    aggregator.apply(final_segment("testing one two"));

    assert_eq!(aggregator.final_text(), "testing one two");
    assert_eq!(aggregator.interim_text(), "");
}

#[test]
fn test_interim_does_not_disturb_finalized_segments() {
    let mut aggregator = TranscriptAggregator::new();

    aggregator.apply(final_segment("first"));
    aggregator.apply(final_segment("second"));
    aggregator.apply(interim_segment("thi", 0.4));

    assert_eq!(aggregator.final_text(), "first second");

    let segments = aggregator.segments();
    assert_eq!(segments.len(), 3);
    assert!(segments[0].is_final);
    assert!(segments[1].is_final);
    assert!(!segments[2].is_final);
    assert_eq!(segments[2].text, "thi");
}

#[test]
fn test_clear_empties_everything() {
    let mut aggregator = TranscriptAggregator::new();

    aggregator.apply(final_segment("hello"));
    aggregator.apply(interim_segment("wor", 0.5));
    aggregator.clear();

    assert!(aggregator.is_empty());
    assert_eq!(aggregator.final_text(), "");
    assert_eq!(aggregator.interim_text(), "");
    assert!(aggregator.segments().is_empty());
}

#[test]
fn test_empty_aggregator() {
    let aggregator = TranscriptAggregator::new();

    assert!(aggregator.is_empty());
    assert_eq!(aggregator.final_text(), "");
    assert_eq!(aggregator.interim_text(), "");
}
