//! Video duration lookup, used only to gate speech-to-text.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::video_id::VideoId;

#[async_trait]
pub trait DurationLookup: Send + Sync {
    /// `None` when the duration cannot be determined.
    async fn duration_secs(&self, video_id: &VideoId) -> Option<u64>;
}

#[derive(Deserialize)]
struct YtDlpInfo {
    duration: Option<f64>,
    is_live: Option<bool>,
}

/// Reads the duration from `yt-dlp --dump-json`.
pub struct YtDlpMetadata {
    bin: String,
}

impl YtDlpMetadata {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for YtDlpMetadata {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

fn parse_duration(json: &[u8]) -> Option<u64> {
    let info: YtDlpInfo = serde_json::from_slice(json).ok()?;
    if info.is_live == Some(true) {
        return None;
    }
    info.duration
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d.ceil() as u64)
}

#[async_trait]
impl DurationLookup for YtDlpMetadata {
    async fn duration_secs(&self, video_id: &VideoId) -> Option<u64> {
        let output = Command::new(&self.bin)
            .args(["--dump-json", "--no-download", "--no-playlist", "--no-exec", "--quiet"])
            .arg(video_id.watch_url())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let duration = parse_duration(&out.stdout);
                debug!(video_id = %video_id, ?duration, "duration lookup");
                duration
            }
            Ok(out) => {
                let stderr: String = String::from_utf8_lossy(&out.stderr).chars().take(300).collect();
                debug!(video_id = %video_id, %stderr, "yt-dlp metadata failed");
                None
            }
            Err(e) => {
                debug!(video_id = %video_id, error = %e, "yt-dlp not runnable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(br#"{"title":"x","duration":212.4}"#), Some(213));
        assert_eq!(parse_duration(br#"{"duration":null}"#), None);
        assert_eq!(parse_duration(br#"{"duration":9000,"is_live":true}"#), None);
        assert_eq!(parse_duration(b"not json"), None);
    }
}
