//! Speech-to-text fallback: audio download, transcode, local recognition.
//!
//! `SttFallback` owns the policy (enablement, duration ceiling, per-stage
//! timeouts); a `SpeechBackend` does the actual work.

pub mod local;
pub mod model;
pub mod whisper;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{SttConfig, TimeoutConfig};
use crate::metadata::DurationLookup;
use crate::types::{Detail, FetchedCaptions, Segment, SkipReason, SourceType, SttOutcome, TranscriptResult};
use crate::video_id::VideoId;

pub use local::LocalSpeechBackend;
pub use model::{ensure_model, ensure_vad_model};
pub use whisper::WhisperRecognizer;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("audio download failed: {0}")]
    Download(String),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SttError {
    pub fn stage(&self) -> &'static str {
        match self {
            SttError::Download(_) => "download",
            SttError::Transcode(_) => "transcode",
            SttError::Recognition(_) => "recognize",
            SttError::Timeout { stage, .. } => *stage,
            SttError::Io(_) => "io",
        }
    }
}

/// Utterances recognized from one waveform.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Downloads the best available audio into `dir`, returning the file path.
    async fn fetch_audio(&self, video_id: &VideoId, dir: &Path) -> Result<PathBuf, SttError>;

    /// Transcodes to 16 kHz mono PCM WAV.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), SttError>;

    async fn recognize(&self, wav: &Path) -> Result<Recognition, SttError>;
}

/// Outcome of one fallback run.
#[derive(Debug, Clone)]
pub struct SttAttempt {
    pub outcome: SttOutcome,
    pub transcript: TranscriptResult,
}

impl SttAttempt {
    fn without_transcript(outcome: SttOutcome, error: Option<String>) -> Self {
        let detail = Detail {
            error,
            ..Detail::default()
        };
        Self {
            outcome,
            transcript: TranscriptResult::none(detail),
        }
    }
}

/// Per-video scratch directory. `cleanup` removes it asynchronously; `Drop`
/// only covers runs that were cancelled before reaching it.
struct ScratchDir {
    path: PathBuf,
    cleaned: bool,
}

impl ScratchDir {
    async fn create() -> std::io::Result<Self> {
        let path = std::env::temp_dir()
            .join("kaption")
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path, cleaned: false })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn cleanup(mut self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            debug!(path = %self.path.display(), error = %e, "scratch cleanup failed");
        }
        self.cleaned = true;
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!(path = %self.path.display(), error = %e, "scratch cleanup failed");
        }
    }
}

async fn bounded<T, F>(stage: &'static str, after: Duration, fut: F) -> Result<T, SttError>
where
    F: std::future::Future<Output = Result<T, SttError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .unwrap_or(Err(SttError::Timeout { stage, after }))
}

/// Gated speech-to-text fallback.
#[derive(Clone)]
pub struct SttFallback {
    backend: Option<Arc<dyn SpeechBackend>>,
    durations: Option<Arc<dyn DurationLookup>>,
    config: SttConfig,
    timeouts: TimeoutConfig,
}

impl SttFallback {
    pub fn new(
        backend: Option<Arc<dyn SpeechBackend>>,
        durations: Option<Arc<dyn DurationLookup>>,
        config: SttConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            backend,
            durations,
            config,
            timeouts,
        }
    }

    pub fn disabled() -> Self {
        Self::new(
            None,
            None,
            SttConfig {
                enabled: false,
                ..SttConfig::default()
            },
            TimeoutConfig::default(),
        )
    }

    /// Runs the fallback. Never fails: stage errors and policy skips are
    /// reported through `SttAttempt::outcome`.
    pub async fn run(&self, video_id: &VideoId, known_duration: Option<u64>) -> SttAttempt {
        let Some(backend) = self.backend.as_ref().filter(|_| self.config.enabled) else {
            return SttAttempt::without_transcript(SttOutcome::Disabled, None);
        };

        let duration = match known_duration {
            Some(d) => Some(d),
            None => self.lookup_duration(video_id).await,
        };
        if let Some(reason) = self.skip_reason(duration) {
            info!(video_id = %video_id, ?duration, max = self.config.max_duration_secs, ?reason, "speech-to-text skipped");
            let outcome = SttOutcome::Skipped {
                reason,
                duration_secs: duration,
                max_duration_secs: self.config.max_duration_secs,
            };
            return SttAttempt::without_transcript(outcome, None);
        }

        info!(video_id = %video_id, ?duration, "running speech-to-text");
        match self.transcribe(backend.as_ref(), video_id).await {
            Ok(recognition) if recognition.segments.is_empty() => {
                warn!(video_id = %video_id, "speech-to-text produced no utterances");
                let outcome = SttOutcome::Failed {
                    stage: "recognize",
                    error: "no speech recognized".to_string(),
                };
                SttAttempt::without_transcript(outcome, Some("no speech recognized".to_string()))
            }
            Ok(recognition) => {
                let outcome = SttOutcome::Succeeded {
                    utterances: recognition.segments.len(),
                    language: recognition.language.clone(),
                };
                let fetched = FetchedCaptions {
                    language: recognition.language.clone(),
                    language_code: recognition.language,
                    is_generated: Some(true),
                    segments: recognition.segments,
                };
                let detail = Detail {
                    path: Some("stt"),
                    ..Detail::default()
                };
                SttAttempt {
                    outcome,
                    transcript: TranscriptResult::found(SourceType::Stt, fetched, detail),
                }
            }
            Err(e) => {
                warn!(video_id = %video_id, stage = e.stage(), error = %e, "speech-to-text failed");
                let outcome = SttOutcome::Failed {
                    stage: e.stage(),
                    error: e.to_string(),
                };
                SttAttempt::without_transcript(outcome, Some(e.to_string()))
            }
        }
    }

    /// `None` means the video may be transcribed. The ceiling is inclusive.
    pub fn skip_reason(&self, duration: Option<u64>) -> Option<SkipReason> {
        match duration {
            None if !self.config.allow_unknown_duration => Some(SkipReason::DurationUnknown),
            Some(d) if d > self.config.max_duration_secs => Some(SkipReason::DurationExceeded),
            _ => None,
        }
    }

    async fn lookup_duration(&self, video_id: &VideoId) -> Option<u64> {
        let lookup = self.durations.as_ref()?;
        match tokio::time::timeout(self.timeouts.metadata(), lookup.duration_secs(video_id)).await {
            Ok(duration) => duration,
            Err(_) => {
                debug!(video_id = %video_id, "duration lookup timed out");
                None
            }
        }
    }

    async fn transcribe(&self, backend: &dyn SpeechBackend, video_id: &VideoId) -> Result<Recognition, SttError> {
        let scratch = ScratchDir::create().await?;
        let result = self.run_stages(backend, video_id, scratch.path()).await;
        scratch.cleanup().await;
        result
    }

    async fn run_stages(
        &self,
        backend: &dyn SpeechBackend,
        video_id: &VideoId,
        dir: &Path,
    ) -> Result<Recognition, SttError> {
        let audio = bounded("download", self.timeouts.download(), backend.fetch_audio(video_id, dir)).await?;
        debug!(video_id = %video_id, path = %audio.display(), "audio downloaded");

        let wav = dir.join("audio.16k.wav");
        bounded("transcode", self.timeouts.transcode(), backend.transcode(&audio, &wav)).await?;

        bounded("recognize", self.timeouts.recognize(), backend.recognize(&wav)).await
    }
}
