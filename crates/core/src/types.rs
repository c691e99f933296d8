use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// One atomic unit of speech as reported by a source: a caption line, a word,
/// or a recognized utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_sec: f64,
    pub duration_sec: f64,
    pub text: String,
}

impl Segment {
    /// Builds a segment, clamping negative or non-finite timings to zero.
    pub fn new(start_sec: f64, duration_sec: f64, text: impl Into<String>) -> Self {
        Self {
            start_sec: non_negative(start_sec),
            duration_sec: non_negative(duration_sec),
            text: text.into(),
        }
    }

    pub fn end_sec(&self) -> f64 {
        self.start_sec + self.duration_sec
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

/// A merged span of speech approximating one spoken thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalSegment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub duration_sec: f64,
    pub text: String,
}

impl NaturalSegment {
    pub fn new(start_sec: f64, end_sec: f64, text: String) -> Self {
        let end_sec = end_sec.max(start_sec);
        Self {
            start_sec,
            end_sec,
            duration_sec: end_sec - start_sec,
            text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Manual,
    Auto,
    Translated,
    /// Direct best-effort fetch; provenance unknown.
    Fetch,
    Stt,
    None,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "MANUAL",
            SourceType::Auto => "AUTO",
            SourceType::Translated => "TRANSLATED",
            SourceType::Fetch => "FETCH",
            SourceType::Stt => "STT",
            SourceType::None => "NONE",
        }
    }
}

/// Generation type of the track a translation was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceOrigin {
    Manual,
    Auto,
}

impl SourceOrigin {
    pub fn from_generated(is_generated: bool) -> Self {
        if is_generated {
            SourceOrigin::Auto
        } else {
            SourceOrigin::Manual
        }
    }
}

/// What happened when one resolver strategy ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found { segments: usize },
    NoMatch,
    Empty,
    Failed { category: &'static str, message: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub strategy: &'static str,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Diagnostics collected while resolving a transcript. Never raised, only recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_origin: Option<SourceOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_language_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tried: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Detail {
    pub fn record(&mut self, strategy: &'static str, outcome: AttemptOutcome) {
        self.attempts.push(Attempt { strategy, outcome });
    }

    pub fn attempted(&self) -> Vec<&'static str> {
        self.attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::Skipped)
            .map(|a| a.strategy)
            .collect()
    }
}

/// Timed text fetched from a caption track, before provenance is assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedCaptions {
    pub language: Option<String>,
    pub language_code: Option<String>,
    pub is_generated: Option<bool>,
    pub segments: Vec<Segment>,
}

/// Uniform output of the caption resolver (and of the speech-to-text fallback).
///
/// `ok` implies non-empty `segments`; `SourceType::None` implies empty `segments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResult {
    pub ok: bool,
    pub source_type: SourceType,
    pub language: Option<String>,
    pub language_code: Option<String>,
    pub is_generated: Option<bool>,
    pub segments: Vec<Segment>,
    pub detail: Detail,
}

impl TranscriptResult {
    /// A successful result. Falls back to `none` when the fetch carried no
    /// segments so the invariants hold by construction.
    pub fn found(source_type: SourceType, fetched: FetchedCaptions, detail: Detail) -> Self {
        if fetched.segments.is_empty() || source_type == SourceType::None {
            return Self::none(detail);
        }
        Self {
            ok: true,
            source_type,
            language: fetched.language,
            language_code: fetched.language_code,
            is_generated: fetched.is_generated,
            segments: fetched.segments,
            detail,
        }
    }

    pub fn none(detail: Detail) -> Self {
        Self {
            ok: false,
            source_type: SourceType::None,
            language: None,
            language_code: None,
            is_generated: None,
            segments: Vec::new(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DurationExceeded,
    DurationUnknown,
}

/// Result of the speech-to-text stage for one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SttOutcome {
    /// Fallback never considered: captions resolved, or the input was invalid.
    NotNeeded,
    Disabled,
    Skipped {
        reason: SkipReason,
        #[serde(rename = "durationSecs")]
        duration_secs: Option<u64>,
        #[serde(rename = "maxDurationSecs")]
        max_duration_secs: u64,
    },
    Failed {
        stage: &'static str,
        error: String,
    },
    Succeeded {
        utterances: usize,
        language: Option<String>,
    },
}

impl SttOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, SttOutcome::Succeeded { .. })
    }
}

/// One scene of a compact view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactScene {
    /// Whole-second range label, e.g. `"12-18"`.
    pub t: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// Size-bounded, sampled representation of a transcript for a context-limited LLM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactView {
    pub title: String,
    pub description: String,
    pub hook: Vec<CompactScene>,
    pub cta: Vec<CompactScene>,
    pub scenes: Vec<CompactScene>,
}

/// One video to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoRequest {
    /// URL or bare video id.
    pub input: String,
    /// Known duration, if the caller already has metadata.
    pub duration_secs: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Caption language priority for this video; the configured list when unset.
    pub languages: Option<Vec<String>>,
}

impl VideoRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn with_languages<S: AsRef<str>>(mut self, languages: &[S]) -> Self {
        self.languages = Some(languages.iter().map(|l| l.as_ref().to_string()).collect());
        self
    }
}

/// Final per-video record produced by the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProcessingResult {
    /// 1-based position in the batch.
    pub index: usize,
    pub url: String,
    pub video_id: Option<String>,
    pub ok: bool,
    pub source_type: SourceType,
    pub language: Option<String>,
    pub language_code: Option<String>,
    pub is_generated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_origin: Option<SourceOrigin>,
    pub confidence: Confidence,
    pub needs_transcript: bool,
    pub stt: SttOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub detail: Detail,
    pub segment_count: usize,
    pub transcript_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_segments: Option<Vec<NaturalSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact: Option<CompactView>,
    /// Raw segments of the chosen source, kept for renderers like SRT.
    #[serde(skip)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningReason {
    InvalidInput,
    SttSkippedDuration,
    SttSkippedUnknownDuration,
    SttDisabled,
    SttFailed,
    NoTranscript,
    PipelineAborted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningDetail {
    pub source_type: SourceType,
    pub attempted: Vec<&'static str>,
    pub stt: SttOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub index: usize,
    pub url: String,
    pub reason: WarningReason,
    pub detail: WarningDetail,
}

/// Ordered results of a batch run plus the warnings it produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub run_id: uuid::Uuid,
    pub count: usize,
    pub videos: Vec<VideoProcessingResult>,
    pub warnings: Vec<Warning>,
}
