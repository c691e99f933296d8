use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kaption_core::stt::SttError;
use kaption_core::config::TimeoutConfig;
use kaption_core::types::{AttemptOutcome, FetchedCaptions, SkipReason, SourceOrigin};
use kaption_core::{
    CaptionError, CaptionResolver, CaptionService, CaptionTrack, Confidence, DurationLookup, FailureKind, Pipeline, PipelineConfig,
    Recognition, Segment, SourceType, SpeechBackend, SttOutcome, VideoId, VideoRequest, WarningReason,
};

const VIDEO: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

fn track(code: &str, generated: bool, translatable: bool) -> CaptionTrack {
    CaptionTrack {
        language_code: code.to_string(),
        language: code.to_string(),
        is_generated: generated,
        is_translatable: translatable,
        base_url: format!("mem://{code}/{generated}"),
    }
}

fn lines(prefix: &str, n: usize) -> Vec<Segment> {
    (0..n)
        .map(|i| Segment::new(i as f64 * 2.0, 1.8, format!("{prefix} line {i}")))
        .collect()
}

struct FakeCaptions {
    tracks: Result<Vec<CaptionTrack>, CaptionError>,
    bodies: HashMap<String, Vec<Segment>>,
    translation: Vec<Segment>,
    direct: Result<Vec<Segment>, CaptionError>,
    list_delay: Duration,
    delays: HashMap<String, Duration>,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCaptions {
    fn with_tracks(tracks: Vec<CaptionTrack>) -> Self {
        Self {
            tracks: Ok(tracks),
            bodies: HashMap::new(),
            translation: Vec::new(),
            direct: Err(CaptionError::NotFound("no direct captions".into())),
            list_delay: Duration::ZERO,
            delays: HashMap::new(),
            list_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn body(mut self, track: &CaptionTrack, segments: Vec<Segment>) -> Self {
        self.bodies.insert(track.base_url.clone(), segments);
        self
    }
}

fn fetched(code: &str, generated: bool, segments: Vec<Segment>) -> FetchedCaptions {
    FetchedCaptions {
        language: Some(code.to_string()),
        language_code: Some(code.to_string()),
        is_generated: Some(generated),
        segments,
    }
}

#[async_trait]
impl CaptionService for FakeCaptions {
    async fn list_tracks(&self, video_id: &VideoId) -> Result<Vec<CaptionTrack>, CaptionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(video_id.as_str()).copied().unwrap_or(self.list_delay);
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.tracks.clone()
    }

    async fn fetch_track(&self, track: &CaptionTrack) -> Result<FetchedCaptions, CaptionError> {
        match self.bodies.get(&track.base_url) {
            Some(segments) => Ok(fetched(&track.language_code, track.is_generated, segments.clone())),
            None => Err(CaptionError::NotFound(track.base_url.clone())),
        }
    }

    async fn fetch_translated(&self, _track: &CaptionTrack, target: &str) -> Result<FetchedCaptions, CaptionError> {
        Ok(fetched(target, true, self.translation.clone()))
    }

    async fn fetch_direct(&self, _video_id: &VideoId, languages: &[String]) -> Result<FetchedCaptions, CaptionError> {
        let segments = self.direct.clone()?;
        Ok(fetched(&languages[0], false, segments))
    }
}

struct FakeSpeech {
    utterances: usize,
    fail_transcode: bool,
    downloads: AtomicUsize,
}

impl FakeSpeech {
    fn new(utterances: usize) -> Self {
        Self {
            utterances,
            fail_transcode: false,
            downloads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpeechBackend for FakeSpeech {
    async fn fetch_audio(&self, _video_id: &VideoId, dir: &Path) -> Result<PathBuf, SttError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(dir.join("source.webm"))
    }

    async fn transcode(&self, _input: &Path, _output: &Path) -> Result<(), SttError> {
        if self.fail_transcode {
            return Err(SttError::Transcode("unsupported codec".into()));
        }
        Ok(())
    }

    async fn recognize(&self, _wav: &Path) -> Result<Recognition, SttError> {
        Ok(Recognition {
            segments: (0..self.utterances)
                .map(|i| Segment::new(i as f64 * 3.0, 2.5, format!("발화 {i}입니다.")))
                .collect(),
            language: Some("ko".to_string()),
        })
    }
}

struct FakeDurations {
    value: Option<u64>,
    calls: AtomicUsize,
}

#[async_trait]
impl DurationLookup for FakeDurations {
    async fn duration_secs(&self, _video_id: &VideoId) -> Option<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        languages: vec!["ko".to_string()],
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_manual_korean_track_skips_speech() {
    let ko = track("ko", false, true);
    let captions = Arc::new(
        FakeCaptions::with_tracks(vec![ko.clone(), track("en", true, true)]).body(&ko, lines("ko", 6)),
    );
    let speech = Arc::new(FakeSpeech::new(3));
    let pipeline = Pipeline::new(&config(), captions.clone(), Some(speech.clone()), None);

    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;

    assert!(result.ok);
    assert_eq!(result.source_type, SourceType::Manual);
    assert_eq!(result.confidence, Confidence::High);
    assert!(!result.needs_transcript);
    assert_eq!(result.stt, SttOutcome::NotNeeded);
    assert_eq!(result.detail.path, Some("list->manual"));
    assert_eq!(result.language_code.as_deref(), Some("ko"));
    assert_eq!(result.segment_count, 6);
    assert!(result.compact.is_some());
    assert!(result.natural_segments.as_ref().is_some_and(|n| !n.is_empty()));
    assert_eq!(speech.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_captions_speech_succeeds_within_ceiling() {
    let captions = Arc::new(FakeCaptions::with_tracks(Vec::new()));
    let speech = Arc::new(FakeSpeech::new(3));
    let pipeline = Pipeline::new(&config(), captions, Some(speech.clone()), None);

    let result = pipeline
        .process_one(1, VideoRequest::new(VIDEO).with_duration(500))
        .await;

    assert!(result.ok);
    assert_eq!(result.source_type, SourceType::Stt);
    assert_eq!(result.confidence, Confidence::Medium);
    assert!(!result.needs_transcript);
    assert_eq!(result.segment_count, 3);
    assert!(matches!(result.stt, SttOutcome::Succeeded { utterances: 3, .. }));
    assert_eq!(result.failure, None);
    assert_eq!(speech.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_long_video_skips_speech_with_warning() {
    let captions = Arc::new(FakeCaptions::with_tracks(Vec::new()));
    let speech = Arc::new(FakeSpeech::new(3));
    let pipeline = Pipeline::new(&config(), captions, Some(speech.clone()), None);

    let outcome = pipeline
        .process_batch(vec![VideoRequest::new(VIDEO).with_duration(1500)], None)
        .await;

    let result = &outcome.videos[0];
    assert!(!result.ok);
    assert_eq!(result.source_type, SourceType::None);
    assert_eq!(result.confidence, Confidence::Low);
    assert!(result.needs_transcript);
    assert_eq!(result.failure, Some(FailureKind::SttSkipped));
    assert!(matches!(
        result.stt,
        SttOutcome::Skipped {
            reason: SkipReason::DurationExceeded,
            duration_secs: Some(1500),
            max_duration_secs: 900,
        }
    ));
    assert_eq!(speech.downloads.load(Ordering::SeqCst), 0);

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].reason, WarningReason::SttSkippedDuration);
    assert_eq!(outcome.warnings[0].index, 1);
}

#[tokio::test]
async fn test_translation_from_generated_track_is_medium() {
    let captions = Arc::new(FakeCaptions {
        translation: lines("번역", 4),
        ..FakeCaptions::with_tracks(vec![track("en", true, true)])
    });
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;

    assert_eq!(result.source_type, SourceType::Translated);
    assert_eq!(result.confidence, Confidence::Medium);
    assert_eq!(result.source_origin, Some(SourceOrigin::Auto));
    assert_eq!(result.detail.target.as_deref(), Some("ko"));
    assert_eq!(result.detail.base_language_code.as_deref(), Some("en"));
    assert_eq!(
        result.detail.attempted(),
        vec!["list->manual", "list->auto", "list->translate"]
    );
}

#[tokio::test]
async fn test_listing_failure_falls_back_to_direct_fetch() {
    let captions = Arc::new(FakeCaptions {
        tracks: Err(CaptionError::Blocked("429 Too Many Requests".into())),
        direct: Ok(lines("direct", 2)),
        ..FakeCaptions::with_tracks(Vec::new())
    });
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;

    assert_eq!(result.source_type, SourceType::Fetch);
    assert_eq!(result.confidence, Confidence::Medium);
    assert!(result.detail.list_error.is_some());
    assert_eq!(result.detail.tried, vec!["ko".to_string(), "ko-KR".to_string()]);
    assert_eq!(result.detail.attempted(), vec!["fetch"]);
}

#[tokio::test]
async fn test_no_match_with_speech_disabled() {
    let captions = Arc::new(FakeCaptions::with_tracks(vec![track("fr", false, false)]));
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let outcome = pipeline.process_batch(vec![VideoRequest::new(VIDEO)], None).await;

    let result = &outcome.videos[0];
    assert_eq!(result.source_type, SourceType::None);
    assert_eq!(result.stt, SttOutcome::Disabled);
    assert_eq!(result.failure, Some(FailureKind::NoTranscript));
    assert_eq!(result.detail.error.as_deref(), Some("NO_MATCH_IN_LIST"));
    assert_eq!(outcome.warnings[0].reason, WarningReason::SttDisabled);
}

#[tokio::test]
async fn test_transcode_failure_is_recorded() {
    let captions = Arc::new(FakeCaptions::with_tracks(Vec::new()));
    let speech = Arc::new(FakeSpeech {
        fail_transcode: true,
        ..FakeSpeech::new(3)
    });
    let pipeline = Pipeline::new(&config(), captions, Some(speech), None);

    let outcome = pipeline
        .process_batch(vec![VideoRequest::new(VIDEO).with_duration(60)], None)
        .await;

    let result = &outcome.videos[0];
    assert_eq!(result.failure, Some(FailureKind::SttFailed));
    assert!(matches!(result.stt, SttOutcome::Failed { stage: "transcode", .. }));
    assert_eq!(outcome.warnings[0].reason, WarningReason::SttFailed);
    assert!(
        outcome.warnings[0]
            .detail
            .message
            .as_deref()
            .is_some_and(|m| m.contains("unsupported codec"))
    );
}

#[tokio::test]
async fn test_duration_lookup_is_lazy() {
    let lines_track = track("ko", false, false);
    let captions = Arc::new(FakeCaptions::with_tracks(vec![lines_track.clone()]).body(&lines_track, lines("ko", 2)));
    let durations = Arc::new(FakeDurations {
        value: Some(300),
        calls: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(&config(), captions, Some(Arc::new(FakeSpeech::new(1))), Some(durations.clone()));

    pipeline.process_one(1, VideoRequest::new(VIDEO)).await;
    assert_eq!(durations.calls.load(Ordering::SeqCst), 0);

    let no_captions = Arc::new(FakeCaptions::with_tracks(Vec::new()));
    let pipeline = Pipeline::new(
        &config(),
        no_captions,
        Some(Arc::new(FakeSpeech::new(2))),
        Some(durations.clone()),
    );
    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;
    assert_eq!(durations.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.source_type, SourceType::Stt);
}

#[tokio::test]
async fn test_unknown_duration_skips_speech() {
    let captions = Arc::new(FakeCaptions::with_tracks(Vec::new()));
    let durations = Arc::new(FakeDurations {
        value: None,
        calls: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(&config(), captions, Some(Arc::new(FakeSpeech::new(2))), Some(durations));

    let outcome = pipeline.process_batch(vec![VideoRequest::new(VIDEO)], None).await;

    assert_eq!(outcome.warnings[0].reason, WarningReason::SttSkippedUnknownDuration);
}

#[tokio::test]
async fn test_listing_timeout_does_not_cancel_speech() {
    let captions = Arc::new(FakeCaptions {
        list_delay: Duration::from_secs(3),
        ..FakeCaptions::with_tracks(Vec::new())
    });
    let mut config = config();
    config.timeouts.list_secs = 1;
    let pipeline = Pipeline::new(&config, captions, Some(Arc::new(FakeSpeech::new(2))), None);

    let result = pipeline
        .process_one(1, VideoRequest::new(VIDEO).with_duration(120))
        .await;

    assert!(result.detail.list_error.as_deref().is_some_and(|e| e.contains("timed out")));
    assert_eq!(result.source_type, SourceType::Stt);
}

#[tokio::test]
async fn test_batch_preserves_order_and_isolates_invalid_input() {
    let ko = track("ko", false, false);
    let mut fake = FakeCaptions::with_tracks(vec![ko.clone()]).body(&ko, lines("ko", 3));
    fake.delays.insert("aaaaaaaaaa1".into(), Duration::from_millis(60));
    fake.delays.insert("bbbbbbbbbb2".into(), Duration::from_millis(5));
    let pipeline = Pipeline::new(&config(), Arc::new(fake), None, None);

    let outcome = pipeline
        .process_batch(vec![
            VideoRequest::new("aaaaaaaaaa1"),
            VideoRequest::new("not a video"),
            VideoRequest::new("https://youtu.be/bbbbbbbbbb2?t=30"),
        ], None)
        .await;

    assert_eq!(outcome.count, 3);
    let ids: Vec<Option<&str>> = outcome.videos.iter().map(|v| v.video_id.as_deref()).collect();
    assert_eq!(ids, vec![Some("aaaaaaaaaa1"), None, Some("bbbbbbbbbb2")]);
    let indices: Vec<usize> = outcome.videos.iter().map(|v| v.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);

    assert_eq!(outcome.videos[1].failure, Some(FailureKind::InvalidInput));
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].reason, WarningReason::InvalidInput);
    assert_eq!(outcome.warnings[0].index, 2);
    assert!(outcome.videos[0].ok && outcome.videos[2].ok);
}

#[tokio::test]
async fn test_batch_respects_concurrency_cap() {
    let captions = Arc::new(FakeCaptions {
        list_delay: Duration::from_millis(30),
        ..FakeCaptions::with_tracks(Vec::new())
    });
    let mut config = config();
    config.concurrency = 2;
    let pipeline = Pipeline::new(&config, captions.clone(), None, None);

    let requests = (0..8).map(|i| VideoRequest::new(format!("video{i:06}"))).collect();
    let outcome = pipeline.process_batch(requests, None).await;

    assert_eq!(outcome.videos.len(), 8);
    assert_eq!(captions.list_calls.load(Ordering::SeqCst), 8);
    assert!(captions.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_batch_serializes_camel_case() {
    let ko = track("ko", false, false);
    let captions = Arc::new(FakeCaptions::with_tracks(vec![ko.clone()]).body(&ko, lines("ko", 2)));
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let outcome = pipeline.process_batch(vec![VideoRequest::new(VIDEO)], None).await;
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["count"], 1);
    assert_eq!(json["videos"][0]["sourceType"], "MANUAL");
    assert_eq!(json["videos"][0]["needsTranscript"], false);
    assert_eq!(json["videos"][0]["stt"]["status"], "not_needed");
    assert!(json["videos"][0].get("segments").is_none());
}

#[tokio::test]
async fn test_generated_track_resolves_as_auto() {
    let ko_auto = track("ko", true, true);
    let captions = Arc::new(FakeCaptions::with_tracks(vec![ko_auto.clone()]).body(&ko_auto, lines("자동", 5)));
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;

    assert!(result.ok);
    assert_eq!(result.source_type, SourceType::Auto);
    assert_eq!(result.confidence, Confidence::Medium);
    assert_eq!(result.is_generated, Some(true));
    assert_eq!(result.detail.path, Some("list->auto"));
    assert_eq!(result.detail.attempts[0].outcome, AttemptOutcome::NoMatch);
}

#[tokio::test]
async fn test_empty_manual_track_falls_through_to_auto() {
    let ko_manual = track("ko", false, true);
    let ko_auto = track("ko", true, true);
    let captions = Arc::new(
        FakeCaptions::with_tracks(vec![ko_manual.clone(), ko_auto.clone()])
            .body(&ko_manual, Vec::new())
            .body(&ko_auto, lines("자동", 3)),
    );
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;

    assert_eq!(result.source_type, SourceType::Auto);
    assert_eq!(result.segment_count, 3);
    assert_eq!(result.detail.attempted(), vec!["list->manual", "list->auto"]);
    assert_eq!(result.detail.attempts[0].outcome, AttemptOutcome::Empty);
}

#[tokio::test]
async fn test_resolver_matches_regional_track_by_family() {
    let ko_kr = track("ko-KR", false, false);
    let captions = Arc::new(
        FakeCaptions::with_tracks(vec![track("en", false, false), ko_kr.clone()]).body(&ko_kr, lines("ko", 2)),
    );
    let resolver = CaptionResolver::new(captions, &TimeoutConfig::default());
    assert_eq!(
        resolver.strategy_names(),
        vec!["list->manual", "list->auto", "list->translate", "fetch"]
    );
    let id = VideoId::parse(VIDEO).unwrap();

    let result = resolver.resolve(&id, &["ko".to_string()]).await;

    assert!(result.ok);
    assert_eq!(result.source_type, SourceType::Manual);
    assert_eq!(result.language_code.as_deref(), Some("ko-KR"));
}

#[tokio::test]
async fn test_translation_from_manual_track_is_high() {
    let captions = Arc::new(FakeCaptions {
        translation: lines("번역", 4),
        ..FakeCaptions::with_tracks(vec![track("en", false, true)])
    });
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let result = pipeline.process_one(1, VideoRequest::new(VIDEO)).await;

    assert_eq!(result.source_type, SourceType::Translated);
    assert_eq!(result.source_origin, Some(SourceOrigin::Manual));
    assert_eq!(result.confidence, Confidence::High);
    assert!(!result.needs_transcript);
}

#[tokio::test]
async fn test_request_languages_override_configured_priority() {
    let ko = track("ko", false, false);
    let en = track("en", false, false);
    let captions = Arc::new(
        FakeCaptions::with_tracks(vec![ko.clone(), en.clone()])
            .body(&ko, lines("ko", 2))
            .body(&en, lines("en", 3)),
    );
    let pipeline = Pipeline::new(&config(), captions, None, None);

    let outcome = pipeline
        .process_batch(
            vec![
                VideoRequest::new(VIDEO),
                VideoRequest::new(VIDEO).with_languages(&["en"]),
            ],
            None,
        )
        .await;

    assert_eq!(outcome.videos[0].language_code.as_deref(), Some("ko"));
    assert_eq!(outcome.videos[1].language_code.as_deref(), Some("en"));
    assert_eq!(outcome.videos[1].segment_count, 3);
}

#[tokio::test]
async fn test_batch_concurrency_argument_overrides_config() {
    let captions = Arc::new(FakeCaptions {
        list_delay: Duration::from_millis(20),
        ..FakeCaptions::with_tracks(Vec::new())
    });
    let mut config = config();
    config.concurrency = 8;
    let pipeline = Pipeline::new(&config, captions.clone(), None, None);

    let requests = (0..5).map(|i| VideoRequest::new(format!("serial{i:05}"))).collect();
    let outcome = pipeline.process_batch(requests, Some(1)).await;
    assert_eq!(outcome.videos.len(), 5);
    assert_eq!(captions.max_in_flight.load(Ordering::SeqCst), 1);

    let requests = (0..3).map(|i| VideoRequest::new(format!("zeroed{i:05}"))).collect();
    let outcome = pipeline.process_batch(requests, Some(0)).await;
    assert_eq!(outcome.videos.len(), 3);
    assert_eq!(captions.list_calls.load(Ordering::SeqCst), 8);
}
