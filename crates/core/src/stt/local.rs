use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::SttConfig;
use crate::stt::{Recognition, SpeechBackend, SttError, WhisperRecognizer};
use crate::video_id::VideoId;

const STDERR_LIMIT: usize = 2000;

/// yt-dlp for audio, ffmpeg for transcoding, whisper.cpp for recognition.
pub struct LocalSpeechBackend {
    ytdlp_bin: String,
    ffmpeg_bin: String,
    max_audio_bytes: u64,
    recognizer: WhisperRecognizer,
}

impl LocalSpeechBackend {
    pub fn new(config: &SttConfig, recognizer: WhisperRecognizer) -> Self {
        Self {
            ytdlp_bin: config.ytdlp_bin.clone(),
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            max_audio_bytes: config.max_audio_bytes,
            recognizer,
        }
    }
}

fn truncated_stderr(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr).trim().chars().take(STDERR_LIMIT).collect()
}

#[async_trait]
impl SpeechBackend for LocalSpeechBackend {
    async fn fetch_audio(&self, video_id: &VideoId, dir: &Path) -> Result<PathBuf, SttError> {
        info!(video_id = %video_id, "downloading audio");

        let template = dir.join("source.%(ext)s");
        let output = Command::new(&self.ytdlp_bin)
            .args(["-f", "bestaudio/best", "--no-playlist", "--no-progress", "--quiet", "--no-exec"])
            .arg("--max-filesize")
            .arg(self.max_audio_bytes.to_string())
            .arg("-o")
            .arg(&template)
            .args(["--print", "after_move:filepath"])
            .arg(video_id.watch_url())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SttError::Download(format!("failed to run {}: {e}", self.ytdlp_bin)))?;

        if !output.status.success() {
            return Err(SttError::Download(format!(
                "yt-dlp failed: {}",
                truncated_stderr(&output.stderr)
            )));
        }

        let printed = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let path = if printed.is_empty() {
            find_source_file(dir).await?
        } else {
            PathBuf::from(printed.lines().last().unwrap_or_default())
        };

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| SttError::Download(format!("downloaded audio missing at {}: {e}", path.display())))?
            .len();
        if size > self.max_audio_bytes {
            return Err(SttError::Download(format!(
                "audio is {size} bytes, limit is {}",
                self.max_audio_bytes
            )));
        }

        debug!(video_id = %video_id, path = %path.display(), size, "audio ready");
        Ok(path)
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), SttError> {
        let result = Command::new(&self.ffmpeg_bin)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-vn", "-ac", "1", "-ar", "16000", "-acodec", "pcm_s16le"])
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SttError::Transcode(format!("failed to run {}: {e}", self.ffmpeg_bin)))?;

        if !result.status.success() {
            return Err(SttError::Transcode(format!(
                "ffmpeg failed: {}",
                truncated_stderr(&result.stderr)
            )));
        }
        Ok(())
    }

    async fn recognize(&self, wav: &Path) -> Result<Recognition, SttError> {
        self.recognizer.recognize_file(wav).await
    }
}

/// Fallback when yt-dlp did not print the final path.
async fn find_source_file(dir: &Path) -> Result<PathBuf, SttError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_source = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == "source");
        if is_source && path.extension().is_some_and(|ext| ext != "part") {
            return Ok(path);
        }
    }
    Err(SttError::Download("yt-dlp produced no audio file".into()))
}
