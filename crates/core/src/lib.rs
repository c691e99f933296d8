pub mod captions;
pub mod compact;
pub mod confidence;
pub mod config;
pub mod error;
pub mod format;
pub mod language;
pub mod metadata;
pub mod pipeline;
pub mod resolver;
pub mod segmenter;
pub mod stt;
pub mod types;
pub mod video_id;

pub use captions::{CaptionError, CaptionService, CaptionTrack, YoutubeCaptions};
pub use compact::Compactor;
pub use confidence::{Assessment, classify};
pub use config::{PipelineConfig, default_config_path};
pub use error::{Error, FailureKind, Result};
pub use format::{format_timestamp, to_srt, transcript_text};
pub use language::expand_language_priority;
pub use metadata::{DurationLookup, YtDlpMetadata};
pub use pipeline::Pipeline;
pub use resolver::{CaptionResolver, CaptionStrategy};
pub use segmenter::NaturalSegmenter;
pub use stt::{
    LocalSpeechBackend, Recognition, SpeechBackend, SttError, SttFallback, WhisperRecognizer, ensure_model, ensure_vad_model,
};
pub use types::{
    BatchOutcome, CompactView, Confidence, NaturalSegment, Segment, SourceType, SttOutcome, TranscriptResult,
    VideoProcessingResult, VideoRequest, Warning, WarningReason,
};
pub use video_id::VideoId;
