use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{Error, Result};

const HUGGINGFACE_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";
const VAD_BASE: &str = "https://huggingface.co/ggml-org/whisper-vad/resolve/main";
pub const VAD_MODEL_FILE: &str = "ggml-silero-v5.1.2.bin";

/// Anything smaller is an error page, not a model.
const MIN_MODEL_BYTES: u64 = 1_000_000;
/// The Silero model is under a megabyte.
const MIN_VAD_MODEL_BYTES: u64 = 100_000;

/// `small` → `ggml-small.bin`; explicit paths are returned as-is.
pub fn model_file_name(model: &str) -> Option<String> {
    if looks_like_path(model) {
        return None;
    }
    Some(format!("ggml-{}.bin", model.trim_start_matches("ggml-").trim_end_matches(".bin")))
}

fn looks_like_path(model: &str) -> bool {
    model.contains('/') || model.contains('\\') || (model.ends_with(".bin") && !model.starts_with("ggml-"))
}

/// Returns a local model file, downloading a named model into `model_dir`
/// when it is not cached yet.
pub async fn ensure_model(model: &str, model_dir: &Path) -> Result<PathBuf> {
    let Some(file_name) = model_file_name(model) else {
        let path = PathBuf::from(model);
        return if path.exists() {
            Ok(path)
        } else {
            Err(Error::ModelNotFound { path })
        };
    };

    cached_or_download(&format!("{HUGGINGFACE_BASE}/{file_name}"), &model_dir.join(&file_name), MIN_MODEL_BYTES).await
}

/// Returns the Silero VAD model: `explicit` when given, otherwise the
/// whisper.cpp ggml build cached in (or downloaded into) `model_dir`.
pub async fn ensure_vad_model(explicit: Option<&Path>, model_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::ModelNotFound {
                path: path.to_path_buf(),
            })
        };
    }
    cached_or_download(&format!("{VAD_BASE}/{VAD_MODEL_FILE}"), &model_dir.join(VAD_MODEL_FILE), MIN_VAD_MODEL_BYTES)
        .await
}

async fn cached_or_download(url: &str, dest: &Path, min_bytes: u64) -> Result<PathBuf> {
    if dest.exists() {
        info!(path = %dest.display(), "model already cached");
        return Ok(dest.to_path_buf());
    }

    if let Some(dir) = dest.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    info!(%url, "downloading model");
    download_model(url, dest, min_bytes).await?;
    Ok(dest.to_path_buf())
}

async fn download_model(url: &str, dest: &Path, min_bytes: u64) -> Result<()> {
    let download_error = |reason: String| Error::ModelDownload {
        url: url.to_string(),
        reason,
    };

    let response = reqwest::get(url)
        .await?
        .error_for_status()
        .map_err(|e| download_error(format!("HTTP error: {e}")))?;
    let total_size = response.content_length().unwrap_or(0);

    let tmp_path = dest.with_extension("bin.part");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut next_report = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        if total_size > 0 && downloaded >= next_report {
            info!(downloaded, total = total_size, "model download progress");
            next_report += total_size / 10;
        }
    }
    file.flush().await?;
    drop(file);

    let file_size = tokio::fs::metadata(&tmp_path).await?.len();
    if file_size < min_bytes {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(download_error(format!(
            "downloaded file too small ({file_size} bytes)"
        )));
    }
    if total_size > 0 && file_size != total_size {
        warn!(expected = total_size, actual = file_size, "model size mismatch");
    }

    tokio::fs::rename(&tmp_path, dest).await?;
    info!(path = %dest.display(), size = file_size, "model saved");
    Ok(())
}
