//! Per-video orchestration and the bounded-concurrency batch runner.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::captions::CaptionService;
use crate::compact::Compactor;
use crate::confidence::classify;
use crate::config::{CompactConfig, MAX_CONCURRENCY, PipelineConfig};
use crate::error::FailureKind;
use crate::format::transcript_text;
use crate::language::expand_language_priority;
use crate::metadata::DurationLookup;
use crate::resolver::CaptionResolver;
use crate::segmenter::NaturalSegmenter;
use crate::stt::{SpeechBackend, SttFallback};
use crate::types::{
    BatchOutcome, Confidence, Detail, NaturalSegment, SkipReason, SourceType, SttOutcome, TranscriptResult,
    VideoProcessingResult, VideoRequest, Warning, WarningDetail, WarningReason,
};
use crate::video_id::VideoId;

/// Runs resolve → fallback → classify → segment → compact for videos.
///
/// Cheap to clone; every clone shares the same collaborators.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: CaptionResolver,
    stt: SttFallback,
    segmenter: NaturalSegmenter,
    compactor: Compactor,
    languages: Vec<String>,
    compact: CompactConfig,
    concurrency: usize,
}

impl Pipeline {
    /// Speech-to-text runs only when `speech` is given and enabled in `config`.
    pub fn new(
        config: &PipelineConfig,
        captions: Arc<dyn CaptionService>,
        speech: Option<Arc<dyn SpeechBackend>>,
        durations: Option<Arc<dyn DurationLookup>>,
    ) -> Self {
        let resolver = CaptionResolver::new(captions, &config.timeouts);
        debug!(strategies = ?resolver.strategy_names(), "caption cascade ready");
        let inner = Inner {
            resolver,
            stt: SttFallback::new(speech, durations, config.stt.clone(), config.timeouts.clone()),
            segmenter: NaturalSegmenter::new(config.segmenter.clone()),
            compactor: Compactor::new(config.compact.clone()),
            languages: config.language_priority(),
            compact: config.compact.clone(),
            concurrency: config.effective_concurrency(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Processes one video. `index` is its 1-based position in the batch.
    pub async fn process_one(&self, index: usize, request: VideoRequest) -> VideoProcessingResult {
        let span = info_span!("video", index, video_id = tracing::field::Empty);
        self.run_video(index, request).instrument(span).await
    }

    async fn run_video(&self, index: usize, request: VideoRequest) -> VideoProcessingResult {
        let inner = &self.inner;
        let url = request.input.trim().to_string();

        let Some(video_id) = VideoId::parse(&url) else {
            warn!(input = %url, "invalid video identifier");
            let detail = Detail {
                error: Some("INVALID_INPUT".to_string()),
                ..Detail::default()
            };
            return empty_result(index, url, None, FailureKind::InvalidInput, detail);
        };
        tracing::Span::current().record("video_id", video_id.as_str());

        let requested;
        let languages = match request.languages.as_deref() {
            Some(list) if !list.is_empty() => {
                requested = expand_language_priority(list);
                &requested
            }
            _ => &inner.languages,
        };

        let resolved = inner.resolver.resolve(&video_id, languages).await;
        let (transcript, stt) = if resolved.ok {
            (resolved, SttOutcome::NotNeeded)
        } else {
            let attempt = inner.stt.run(&video_id, request.duration_secs).await;
            (merge_stt(resolved, attempt.transcript), attempt.outcome)
        };

        let assessment = classify(
            transcript.source_type,
            transcript.detail.source_origin,
            &stt,
            transcript.segments.len(),
        );
        let failure = (!transcript.ok).then(|| failure_kind(&stt, &transcript.detail));

        let segments = transcript.segments;
        let natural = self.segment(&segments).await;
        let compact = (!natural.is_empty()).then(|| {
            inner.compactor.compact(
                request.title.as_deref().unwrap_or_default(),
                request.description.as_deref().unwrap_or_default(),
                &natural,
            )
        });
        let text = (!segments.is_empty()).then(|| transcript_text(&segments, Some(inner.compact.max_transcript_chars)));

        info!(
            source = transcript.source_type.as_str(),
            segments = segments.len(),
            natural = natural.len(),
            confidence = ?assessment.confidence,
            "video processed"
        );

        VideoProcessingResult {
            index,
            url,
            video_id: Some(video_id.to_string()),
            ok: transcript.ok,
            source_type: transcript.source_type,
            language: transcript.language,
            language_code: transcript.language_code,
            is_generated: transcript.is_generated,
            source_origin: transcript.detail.source_origin,
            confidence: assessment.confidence,
            needs_transcript: assessment.needs_transcript,
            stt,
            failure,
            detail: transcript.detail,
            segment_count: segments.len(),
            transcript_chars: text.as_ref().map_or(0, |t| t.chars().count()),
            transcript_text: text,
            natural_segments: inner.compact.include_segments.then_some(natural),
            compact,
            segments,
        }
    }

    /// Segmentation is CPU work; keep it off the scheduler threads.
    async fn segment(&self, segments: &[crate::types::Segment]) -> Vec<NaturalSegment> {
        if segments.is_empty() {
            return Vec::new();
        }
        let segmenter = self.inner.segmenter.clone();
        let input = segments.to_vec();
        match tokio::task::spawn_blocking(move || segmenter.segment(&input)).await {
            Ok(natural) => natural,
            Err(e) => {
                warn!(error = %e, "segmentation task failed");
                Vec::new()
            }
        }
    }

    /// Processes every request with at most `concurrency` in flight (clamped
    /// to 1..=20, the configured value when `None`). Results keep input order;
    /// one video's failure never affects another.
    pub async fn process_batch(&self, requests: Vec<VideoRequest>, concurrency: Option<usize>) -> BatchOutcome {
        let run_id = Uuid::new_v4();
        let limit = concurrency.map_or(self.inner.concurrency, |n| n.clamp(1, MAX_CONCURRENCY));
        let span = info_span!("batch", %run_id, count = requests.len());
        self.run_batch(run_id, requests, limit).instrument(span).await
    }

    async fn run_batch(&self, run_id: Uuid, requests: Vec<VideoRequest>, limit: usize) -> BatchOutcome {
        let count = requests.len();
        info!(concurrency = limit, "batch started");
        let semaphore = Arc::new(Semaphore::new(limit));

        let handles: Vec<_> = requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| {
                let index = i + 1;
                let url = request.input.trim().to_string();
                let pipeline = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let handle = tokio::spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        pipeline.process_one(index, request).await
                    }
                    .in_current_span(),
                );
                (index, url, handle)
            })
            .collect();

        let mut videos = Vec::with_capacity(count);
        let mut warnings = Vec::new();
        for (index, url, handle) in handles {
            match handle.await {
                Ok(result) => {
                    if let Some(warning) = warning_for(&result) {
                        warnings.push(warning);
                    }
                    videos.push(result);
                }
                Err(e) => {
                    warn!(index, error = %e, "video pipeline aborted");
                    let detail = Detail {
                        error: Some(format!("pipeline task aborted: {e}")),
                        ..Detail::default()
                    };
                    let video_id = VideoId::parse(&url).map(|id| id.to_string());
                    let result = empty_result(index, url, video_id, FailureKind::NoTranscript, detail);
                    warnings.push(build_warning(&result, WarningReason::PipelineAborted));
                    videos.push(result);
                }
            }
        }

        info!(
            ok = videos.iter().filter(|v| v.ok).count(),
            warnings = warnings.len(),
            "batch finished"
        );
        BatchOutcome {
            run_id,
            count,
            videos,
            warnings,
        }
    }
}

/// Keeps the caption cascade diagnostics and adopts the speech result.
fn merge_stt(captions: TranscriptResult, stt: TranscriptResult) -> TranscriptResult {
    let mut detail = captions.detail;
    if stt.ok {
        detail.path = stt.detail.path;
        detail.error = None;
        TranscriptResult { detail, ..stt }
    } else {
        debug!(error = ?stt.detail.error, "speech fallback produced nothing");
        TranscriptResult { detail, ..captions }
    }
}

fn failure_kind(stt: &SttOutcome, detail: &Detail) -> FailureKind {
    match stt {
        SttOutcome::Skipped { .. } => FailureKind::SttSkipped,
        SttOutcome::Failed { .. } => FailureKind::SttFailed,
        _ if detail.list_error.is_some() => FailureKind::SourceUnavailable,
        _ => FailureKind::NoTranscript,
    }
}

fn empty_result(
    index: usize,
    url: String,
    video_id: Option<String>,
    failure: FailureKind,
    detail: Detail,
) -> VideoProcessingResult {
    VideoProcessingResult {
        index,
        url,
        video_id,
        ok: false,
        source_type: SourceType::None,
        language: None,
        language_code: None,
        is_generated: None,
        source_origin: None,
        confidence: Confidence::Low,
        needs_transcript: true,
        stt: SttOutcome::NotNeeded,
        failure: Some(failure),
        detail,
        segment_count: 0,
        transcript_chars: 0,
        transcript_text: None,
        natural_segments: None,
        compact: None,
        segments: Vec::new(),
    }
}

/// A warning for every video left without a usable transcript.
pub fn warning_for(result: &VideoProcessingResult) -> Option<Warning> {
    if !result.needs_transcript {
        return None;
    }
    let reason = match (&result.failure, &result.stt) {
        (Some(FailureKind::InvalidInput), _) => WarningReason::InvalidInput,
        (_, SttOutcome::Skipped { reason: SkipReason::DurationExceeded, .. }) => WarningReason::SttSkippedDuration,
        (_, SttOutcome::Skipped { reason: SkipReason::DurationUnknown, .. }) => {
            WarningReason::SttSkippedUnknownDuration
        }
        (_, SttOutcome::Disabled) => WarningReason::SttDisabled,
        (_, SttOutcome::Failed { .. }) => WarningReason::SttFailed,
        _ => WarningReason::NoTranscript,
    };
    Some(build_warning(result, reason))
}

fn build_warning(result: &VideoProcessingResult, reason: WarningReason) -> Warning {
    let message = match &result.stt {
        SttOutcome::Failed { stage, error } => Some(format!("{stage}: {error}")),
        _ => result.detail.error.clone().or_else(|| result.detail.list_error.clone()),
    };
    Warning {
        index: result.index,
        url: result.url.clone(),
        reason,
        detail: WarningDetail {
            source_type: result.source_type,
            attempted: result.detail.attempted(),
            stt: result.stt.clone(),
            message,
        },
    }
}
