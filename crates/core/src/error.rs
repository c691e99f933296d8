use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors that make the pipeline unusable for every video. These propagate;
/// per-video failures are recorded in results instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing credentials: {what}")]
    MissingCredentials { what: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Whisper model not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("Model download failed for {url}: {reason}")]
    ModelDownload { url: String, reason: String },

    #[error("Failed to load whisper model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-video failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Malformed video identifier; not retried.
    InvalidInput,
    /// A caption listing/fetch/translate call failed; the cascade moved on.
    SourceUnavailable,
    /// Speech-to-text not attempted by policy.
    SttSkipped,
    /// Download, transcode or recognition failed.
    SttFailed,
    /// Every stage exhausted.
    NoTranscript,
}
