use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::language::expand_language_priority;

pub const MAX_CONCURRENCY: usize = 20;

/// Process-wide pipeline configuration. Read once, passed explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub languages: Vec<String>,
    pub concurrency: usize,
    pub timeouts: TimeoutConfig,
    pub captions: CaptionConfig,
    pub stt: SttConfig,
    pub segmenter: SegmenterConfig,
    pub compact: CompactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub list_secs: u64,
    pub fetch_secs: u64,
    pub download_secs: u64,
    pub transcode_secs: u64,
    pub recognize_secs: u64,
    pub metadata_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub user_agent: String,
}

impl fmt::Debug for CaptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionConfig")
            .field("proxy_url", &self.proxy_url)
            .field("proxy_username", &self.proxy_username)
            .field(
                "proxy_password",
                &self.proxy_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub enabled: bool,
    /// Videos longer than this are never sent to speech recognition.
    pub max_duration_secs: u64,
    pub allow_unknown_duration: bool,
    /// ggml model name (`small`, `medium-q5_0`, ...) or a path to a model file.
    pub model: String,
    pub model_dir: Option<PathBuf>,
    /// Voice-activity gating so silence is never decoded.
    pub vad: bool,
    /// Silero VAD model file; downloaded into `model_dir` when unset.
    pub vad_model: Option<PathBuf>,
    /// Utterances whose no-speech probability exceeds this are dropped.
    pub no_speech_threshold: f32,
    pub threads: Option<u32>,
    /// Concurrent inferences allowed against the loaded model.
    pub inference_permits: usize,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub max_audio_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub pause_secs: f64,
    pub max_span_secs: f64,
    pub max_chars: usize,
    pub min_sentence_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactConfig {
    pub max_scenes: usize,
    pub max_chars_per_scene: usize,
    pub max_title_chars: usize,
    pub max_description_chars: usize,
    pub max_transcript_chars: usize,
    pub include_segments: bool,
}

// --- Default implementations ---

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            languages: vec!["ko".to_string(), "en".to_string()],
            concurrency: 4,
            timeouts: TimeoutConfig::default(),
            captions: CaptionConfig::default(),
            stt: SttConfig::default(),
            segmenter: SegmenterConfig::default(),
            compact: CompactConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            list_secs: 20,
            fetch_secs: 20,
            download_secs: 240,
            transcode_secs: 120,
            recognize_secs: 900,
            metadata_secs: 30,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_duration_secs: 900,
            allow_unknown_duration: false,
            model: "small".to_string(),
            model_dir: None,
            vad: true,
            vad_model: None,
            no_speech_threshold: 0.6,
            threads: None,
            inference_permits: 1,
            ytdlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            max_audio_bytes: 60 * 1024 * 1024,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            pause_secs: 1.5,
            max_span_secs: 15.0,
            max_chars: 240,
            min_sentence_secs: 3.0,
        }
    }
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            max_scenes: 18,
            max_chars_per_scene: 160,
            max_title_chars: 120,
            max_description_chars: 300,
            max_transcript_chars: 18_000,
            include_segments: true,
        }
    }
}

impl TimeoutConfig {
    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }

    pub fn recognize(&self) -> Duration {
        Duration::from_secs(self.recognize_secs)
    }

    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }
}

impl SttConfig {
    pub fn resolve_model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("kaption")
                .join("models")
        })
    }
}

impl PipelineConfig {
    /// Loads from `path`, or the default config file if it exists, or defaults.
    /// Environment overrides are applied last, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Applies `KAPTION_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = lookup("KAPTION_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            self.concurrency = n;
        }
        if let Some(model) = lookup("KAPTION_STT_MODEL").filter(|v| !v.trim().is_empty()) {
            self.stt.model = model.trim().to_string();
        }
        if let Some(enabled) = lookup("KAPTION_STT_ENABLED").and_then(|v| parse_bool(&v)) {
            self.stt.enabled = enabled;
        }
        if let Some(url) = lookup("KAPTION_PROXY_URL").filter(|v| !v.trim().is_empty()) {
            self.captions.proxy_url = Some(url.trim().to_string());
        }
        if let Some(user) = lookup("KAPTION_PROXY_USERNAME").filter(|v| !v.trim().is_empty()) {
            self.captions.proxy_username = Some(user.trim().to_string());
        }
        if let Some(pass) = lookup("KAPTION_PROXY_PASSWORD").filter(|v| !v.is_empty()) {
            self.captions.proxy_password = Some(pass);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let captions = &self.captions;
        match (&captions.proxy_username, &captions.proxy_password) {
            (Some(_), None) => {
                return Err(Error::MissingCredentials {
                    what: "proxy password (KAPTION_PROXY_PASSWORD) is required with a proxy username".into(),
                });
            }
            (None, Some(_)) => {
                return Err(Error::MissingCredentials {
                    what: "proxy username (KAPTION_PROXY_USERNAME) is required with a proxy password".into(),
                });
            }
            _ => {}
        }
        if captions.proxy_username.is_some() && captions.proxy_url.is_none() {
            return Err(config_error("proxy credentials given without captions.proxy_url"));
        }

        let t = &self.timeouts;
        let stage_timeouts = [
            ("list_secs", t.list_secs),
            ("fetch_secs", t.fetch_secs),
            ("download_secs", t.download_secs),
            ("transcode_secs", t.transcode_secs),
            ("recognize_secs", t.recognize_secs),
            ("metadata_secs", t.metadata_secs),
        ];
        if let Some((name, _)) = stage_timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(config_error(&format!("timeouts.{name} must be > 0")));
        }

        let seg = &self.segmenter;
        if !(seg.pause_secs > 0.0 && seg.max_span_secs > 0.0 && seg.min_sentence_secs >= 0.0) {
            return Err(config_error("segmenter durations must be positive"));
        }
        if seg.max_chars == 0 {
            return Err(config_error("segmenter.max_chars must be > 0"));
        }
        if self.compact.max_chars_per_scene == 0 {
            return Err(config_error("compact.max_chars_per_scene must be > 0"));
        }
        if self.stt.inference_permits == 0 {
            return Err(config_error("stt.inference_permits must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.stt.no_speech_threshold) {
            return Err(config_error("stt.no_speech_threshold must be within 0..=1"));
        }
        Ok(())
    }

    pub fn language_priority(&self) -> Vec<String> {
        expand_language_priority(&self.languages)
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kaption").join("config.toml"))
}

fn config_error(reason: &str) -> Error {
    Error::Config {
        reason: reason.to_string(),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.stt.max_duration_secs, 900);
        assert_eq!(config.compact.max_scenes, 18);
        assert_eq!(config.compact.max_chars_per_scene, 160);
        assert!(config.stt.vad);
        assert_eq!(
            config.language_priority(),
            vec!["ko", "ko-KR", "en", "en-US", "en-GB"]
        );
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            languages = ["ja"]

            [stt]
            max_duration_secs = 600

            [compact]
            max_scenes = 12
        "#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.languages, vec!["ja"]);
        assert_eq!(config.stt.max_duration_secs, 600);
        assert_eq!(config.compact.max_scenes, 12);
        // Unspecified fields keep their defaults
        assert!(config.stt.enabled);
        assert_eq!(config.compact.max_chars_per_scene, 160);
        assert_eq!(config.timeouts.list_secs, 20);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "concurrency = 7\n[stt]\nenabled = false\n").unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.concurrency, 7);
        assert!(!config.stt.enabled);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("KAPTION_CONCURRENCY", "9"),
            ("KAPTION_STT_MODEL", "medium-q5_0"),
            ("KAPTION_STT_ENABLED", "off"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.concurrency, 9);
        assert_eq!(config.stt.model, "medium-q5_0");
        assert!(!config.stt.enabled);
    }

    #[test]
    fn test_username_without_password_is_missing_credentials() {
        let mut config = PipelineConfig::default();
        config.captions.proxy_url = Some("http://proxy:8080".into());
        config.captions.proxy_username = Some("user".into());
        assert!(matches!(
            config.validate(),
            Err(Error::MissingCredentials { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = PipelineConfig::default();
        config.timeouts.list_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeouts.list_secs"));

        let mut config = PipelineConfig::default();
        config.timeouts.recognize_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_vad_can_be_turned_off() {
        let config: PipelineConfig = toml::from_str("[stt]\nvad = false\n").unwrap();
        assert!(!config.stt.vad);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let mut config = CaptionConfig::default();
        config.proxy_password = Some("hunter2".into());
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn test_concurrency_is_clamped() {
        let mut config = PipelineConfig::default();
        config.concurrency = 0;
        assert_eq!(config.effective_concurrency(), 1);
        config.concurrency = 500;
        assert_eq!(config.effective_concurrency(), MAX_CONCURRENCY);
    }
}
