use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kaption_core::{
    BatchOutcome, Confidence, LocalSpeechBackend, Pipeline, PipelineConfig, SpeechBackend, VideoRequest,
    WhisperRecognizer, YoutubeCaptions, YtDlpMetadata, ensure_model, ensure_vad_model, format_timestamp, to_srt,
};
use tokio::fs;
use tracing::info;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "kaption")]
#[command(about = "Resolve time-aligned transcripts for videos and compact them for LLM analysis")]
struct Cli {
    /// Video URLs or ids
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Config file (defaults to ~/.config/kaption/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Preferred caption language, in priority order (repeatable)
    #[arg(short, long = "lang")]
    langs: Vec<String>,

    /// Videos processed concurrently (1-20)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Never fall back to local speech recognition
    #[arg(long)]
    no_stt: bool,

    /// Longest video (seconds) sent to speech recognition
    #[arg(long)]
    max_duration: Option<u64>,

    /// Scene budget of the compact view
    #[arg(long)]
    max_scenes: Option<usize>,

    /// Known duration in seconds, applied to every input
    #[arg(long)]
    duration: Option<u64>,

    /// Write one .srt per transcribed video into this directory
    #[arg(long)]
    srt_dir: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut PipelineConfig) {
        if !self.langs.is_empty() {
            config.languages = self.langs.clone();
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if self.no_stt {
            config.stt.enabled = false;
        }
        if let Some(secs) = self.max_duration {
            config.stt.max_duration_secs = secs;
        }
        if let Some(k) = self.max_scenes {
            config.compact.max_scenes = k;
        }
    }

    /// Inputs with duplicates removed, first occurrence wins.
    fn unique_inputs(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.inputs
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let spinner_style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

extern "C" fn whisper_log_callback(
    _level: u32,
    _message: *const std::ffi::c_char,
    _user_data: *mut std::ffi::c_void,
) {
    // silent
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "kaption=debug,kaption_core=debug"
    } else {
        "kaption=info,kaption_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn build_speech(config: &PipelineConfig) -> Result<Option<Arc<dyn SpeechBackend>>> {
    if !config.stt.enabled {
        return Ok(None);
    }

    let step_start = Instant::now();
    let spinner = create_spinner("Checking whisper model...");
    let model_dir = config.stt.resolve_model_dir();
    let model_path = ensure_model(&config.stt.model, &model_dir).await?;
    let vad_model = if config.stt.vad {
        spinner.set_message("Checking VAD model...");
        Some(ensure_vad_model(config.stt.vad_model.as_deref(), &model_dir).await?)
    } else {
        None
    };

    spinner.set_message("Loading whisper model...");
    let stt = config.stt.clone();
    let load_path = model_path.clone();
    let recognizer = tokio::task::spawn_blocking(move || {
        WhisperRecognizer::load(&load_path, vad_model.as_deref(), &stt)
    })
    .await
    .context("model loading task failed")??;
    spinner.finish_with_message(format!(
        "{} Model ready: {} {}",
        style("✓").green().bold(),
        style(model_path.display()).dim(),
        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
    ));

    Ok(Some(Arc::new(LocalSpeechBackend::new(&config.stt, recognizer))))
}

async fn write_srt_files(outcome: &BatchOutcome, dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).await?;
    let mut written = 0;
    for video in outcome.videos.iter().filter(|v| v.ok) {
        let Some(id) = &video.video_id else {
            continue;
        };
        let path = dir.join(format!("{id}.srt"));
        fs::write(&path, to_srt(&video.segments))
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn print_summary(outcome: &BatchOutcome) {
    eprintln!("{}", style("─".repeat(60)).dim());
    for video in &outcome.videos {
        let mark = if video.ok {
            style("✓").green().bold()
        } else {
            style("✗").red().bold()
        };
        let confidence = match video.confidence {
            Confidence::High => style("high").green(),
            Confidence::Medium => style("medium").yellow(),
            Confidence::Low => style("low").red(),
        };
        let covered = video
            .segments
            .last()
            .map(|s| format_timestamp(s.start_sec + s.duration_sec))
            .unwrap_or_else(|| "--:--".to_string());
        eprintln!(
            "{} {:>3}  {}  {}  {}  {}",
            mark,
            video.index,
            style(video.video_id.as_deref().unwrap_or(&video.url)).cyan(),
            video.source_type.as_str(),
            confidence,
            style(format!("{} segments, {}", video.segment_count, covered)).dim()
        );
    }
    for warning in &outcome.warnings {
        eprintln!(
            "{} #{} {:?}{}",
            style("!").yellow().bold(),
            warning.index,
            warning.reason,
            warning
                .detail
                .message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    unsafe {
        whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
    }

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let inputs = cli.unique_inputs();
    info!(inputs = inputs.len(), concurrency = config.effective_concurrency(), "starting");

    eprintln!(
        "\n{}  {}\n",
        style("kaption").cyan().bold(),
        style("Transcript Resolver").dim()
    );

    let captions = Arc::new(YoutubeCaptions::new(&config.captions)?);
    let speech = build_speech(&config).await?;
    let durations = Arc::new(YtDlpMetadata::new(config.stt.ytdlp_bin.clone()));
    let pipeline = Pipeline::new(&config, captions, speech, Some(durations));

    let requests: Vec<VideoRequest> = inputs
        .into_iter()
        .map(|input| VideoRequest {
            duration_secs: cli.duration,
            ..VideoRequest::new(input)
        })
        .collect();

    let total_start = Instant::now();
    let spinner = create_spinner(&format!("Resolving {} video(s)...", requests.len()));
    let outcome = pipeline.process_batch(requests, None).await;
    spinner.finish_with_message(format!(
        "{} Resolved {}/{} {}",
        style("✓").green().bold(),
        outcome.videos.iter().filter(|v| v.ok).count(),
        outcome.count,
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    ));

    if let Some(dir) = &cli.srt_dir {
        let written = write_srt_files(&outcome, dir).await?;
        eprintln!(
            "{} {} SRT file(s) in {}",
            style("Saved:").dim(),
            written,
            style(dir.display()).cyan()
        );
    }

    print_summary(&outcome);

    let json = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", json);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_inputs_keep_first_order() {
        let cli = Cli::parse_from(["kaption", "b", " a ", "b", "a", "c"]);
        assert_eq!(cli.unique_inputs(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "kaption", "--lang", "en", "--lang", "ja", "-j", "8", "--no-stt", "--max-duration", "600", "x",
        ]);
        let mut config = PipelineConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.languages, vec!["en", "ja"]);
        assert_eq!(config.concurrency, 8);
        assert!(!config.stt.enabled);
        assert_eq!(config.stt.max_duration_secs, 600);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
