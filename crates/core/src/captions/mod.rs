//! Caption-service boundary: track listing, fetching and translation.

pub mod timedtext;
pub mod youtube;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::FetchedCaptions;
use crate::video_id::VideoId;

pub use youtube::YoutubeCaptions;

/// A caption track advertised for a video.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub language_code: String,
    pub language: String,
    pub is_generated: bool,
    pub is_translatable: bool,
    /// Service-specific handle used to fetch the track.
    pub base_url: String,
}

/// Distinguishable caption-service failure categories.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptionError {
    #[error("captions are disabled for this video")]
    Disabled,

    #[error("video or caption not found: {0}")]
    NotFound(String),

    #[error("request blocked or rate limited: {0}")]
    Blocked(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl CaptionError {
    pub fn category(&self) -> &'static str {
        match self {
            CaptionError::Disabled => "disabled",
            CaptionError::NotFound(_) => "not_found",
            CaptionError::Blocked(_) => "blocked",
            CaptionError::Network(_) => "network",
            CaptionError::Timeout(_) => "timeout",
            CaptionError::Malformed(_) => "malformed",
        }
    }
}

impl From<reqwest::Error> for CaptionError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().is_some_and(|s| s.as_u16() == 429) {
            CaptionError::Blocked(e.to_string())
        } else if e.status().is_some_and(|s| s.as_u16() == 404) {
            CaptionError::NotFound(e.to_string())
        } else if e.is_decode() {
            CaptionError::Malformed(e.to_string())
        } else {
            CaptionError::Network(e.to_string())
        }
    }
}

/// Captions provider consumed by the resolver.
#[async_trait]
pub trait CaptionService: Send + Sync {
    async fn list_tracks(&self, video_id: &VideoId) -> Result<Vec<CaptionTrack>, CaptionError>;

    async fn fetch_track(&self, track: &CaptionTrack) -> Result<FetchedCaptions, CaptionError>;

    async fn fetch_translated(
        &self,
        track: &CaptionTrack,
        target_language: &str,
    ) -> Result<FetchedCaptions, CaptionError>;

    /// Best-effort fetch without a listing; provenance unknown.
    async fn fetch_direct(
        &self,
        video_id: &VideoId,
        languages: &[String],
    ) -> Result<FetchedCaptions, CaptionError>;
}

/// Bounds a caption call; an elapsed timer becomes `CaptionError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, CaptionError>
where
    F: Future<Output = Result<T, CaptionError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(CaptionError::Timeout(limit)))
}
