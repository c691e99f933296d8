use serde::Serialize;

use crate::types::{Confidence, SourceOrigin, SourceType, SttOutcome};

/// Trust tier derived from provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub confidence: Confidence,
    pub needs_transcript: bool,
}

const SOURCE_CONFIDENCE: [(SourceType, Confidence); 6] = [
    (SourceType::Manual, Confidence::High),
    (SourceType::Auto, Confidence::Medium),
    (SourceType::Translated, Confidence::Medium),
    (SourceType::Fetch, Confidence::Medium),
    (SourceType::Stt, Confidence::Medium),
    (SourceType::None, Confidence::Low),
];

fn lookup(source: SourceType) -> Confidence {
    SOURCE_CONFIDENCE
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, c)| *c)
        .unwrap_or(Confidence::Low)
}

/// Pure classification of a resolved transcript.
///
/// An empty final segment list is always `low`, whatever the claimed source.
/// `low` and `needs_transcript` hold exactly when there are no segments; a
/// non-empty list with an inconsistent source claim is capped at `medium`.
pub fn classify(
    source: SourceType,
    origin: Option<SourceOrigin>,
    stt: &SttOutcome,
    segment_count: usize,
) -> Assessment {
    let confidence = if segment_count == 0 {
        Confidence::Low
    } else {
        match source {
            SourceType::Translated if origin == Some(SourceOrigin::Manual) => Confidence::High,
            SourceType::None => Confidence::Medium,
            SourceType::Stt if !stt.succeeded() => Confidence::Medium,
            other => lookup(other),
        }
    };

    Assessment {
        confidence,
        needs_transcript: segment_count == 0,
    }
}
