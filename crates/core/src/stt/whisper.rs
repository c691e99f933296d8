use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::SttConfig;
use crate::error::{Error, Result};
use crate::stt::{Recognition, SttError};
use crate::types::Segment;

const SAMPLE_RATE: u32 = 16_000;

/// Bounds blocking inference jobs.
///
/// The permit moves into the blocking task, so a caller that stops waiting
/// (timeout, cancelled video) does not free a slot while its job still runs.
/// The job gets a flag that is raised once nobody waits for its result.
#[derive(Clone)]
pub(crate) struct InferenceGate {
    permits: Arc<Semaphore>,
}

/// Raises the cancel flag when the waiting future goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl InferenceGate {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    pub(crate) async fn run<T, F>(&self, job: F) -> std::result::Result<T, SttError>
    where
        F: FnOnce(Arc<AtomicBool>) -> std::result::Result<T, SttError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| SttError::Recognition(e.to_string()))?;

        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(cancel)
        })
        .await
        .map_err(|e| SttError::Recognition(format!("inference task aborted: {e}")))?
    }
}

/// whisper.cpp polls this between compute steps; `true` aborts the run.
unsafe extern "C" fn abort_requested(user_data: *mut c_void) -> bool {
    if user_data.is_null() {
        return false;
    }
    // SAFETY: points at the AtomicBool kept alive by `run` for the whole call.
    unsafe { (*(user_data as *const AtomicBool)).load(Ordering::Relaxed) }
}

/// A whisper.cpp model loaded once and shared by every video.
///
/// Inference runs on the blocking pool; `inference_permits` bounds how many
/// run against the context at the same time.
#[derive(Clone)]
pub struct WhisperRecognizer {
    ctx: Arc<WhisperContext>,
    gate: InferenceGate,
    threads: Option<u32>,
    vad_model: Option<PathBuf>,
    no_speech_threshold: f32,
}

impl WhisperRecognizer {
    /// Loads the model. VAD gating is on when `vad_model` is given.
    pub fn load(model_path: &Path, vad_model: Option<&Path>, config: &SttConfig) -> Result<Self> {
        info!(model = %model_path.display(), "loading whisper model");

        let model_str = model_path.to_str().ok_or_else(|| Error::ModelLoad {
            path: model_path.to_path_buf(),
            reason: "model path contains invalid UTF-8".into(),
        })?;

        let ctx_params = WhisperContextParameters {
            use_gpu: cfg!(feature = "cuda"),
            flash_attn: cfg!(feature = "cuda"),
            ..Default::default()
        };
        let ctx = WhisperContext::new_with_params(model_str, ctx_params).map_err(|e| Error::ModelLoad {
            path: model_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(vad) = vad_model
            && !vad.exists()
        {
            return Err(Error::ModelNotFound { path: vad.to_path_buf() });
        }

        Ok(Self {
            ctx: Arc::new(ctx),
            gate: InferenceGate::new(config.inference_permits),
            threads: config.threads,
            vad_model: vad_model.map(Path::to_path_buf),
            no_speech_threshold: config.no_speech_threshold,
        })
    }

    pub async fn recognize_file(&self, wav: &Path) -> std::result::Result<Recognition, SttError> {
        let this = self.clone();
        let wav = wav.to_path_buf();
        self.gate
            .run(move |cancel| {
                let samples = read_samples(&wav)?;
                this.run(&samples, &cancel)
            })
            .await
    }

    fn run(&self, samples: &[f32], cancel: &Arc<AtomicBool>) -> std::result::Result<Recognition, SttError> {
        let mut state = self.ctx.create_state().map_err(recognition_error)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some("auto"));
        if let Some(n) = self.threads {
            params.set_n_threads(n as i32);
        }

        let vad_model = self.vad_model.as_ref().and_then(|p| p.to_str());
        if let Some(vad_model) = vad_model {
            // the path must be set first, enable_vad checks it
            params.set_vad_model_path(Some(vad_model));
            params.enable_vad(true);
        }

        // SAFETY: `cancel` outlives `state.full` below, and the callback only reads it.
        unsafe {
            params.set_abort_callback(Some(abort_requested));
            params.set_abort_callback_user_data(Arc::as_ptr(cancel) as *mut c_void);
        }

        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);

        debug!(samples = samples.len(), "running whisper inference");
        state.full(params, samples).map_err(recognition_error)?;
        if cancel.load(Ordering::Relaxed) {
            return Err(SttError::Recognition("inference abandoned".into()));
        }

        let num_segments = state.full_n_segments();
        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let Some(segment) = state.get_segment(i) else {
                continue;
            };
            if segment.no_speech_probability() > self.no_speech_threshold {
                continue;
            }
            let text = match segment.to_str_lossy() {
                Ok(text) => text.trim().to_string(),
                Err(_) => continue,
            };
            if text.is_empty() {
                continue;
            }
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = segment.end_timestamp() as f64 / 100.0;
            segments.push(Segment::new(start, (end - start).max(0.0), text));
        }

        let language = whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string);
        debug!(utterances = segments.len(), ?language, "whisper inference complete");

        Ok(Recognition { segments, language })
    }
}

fn recognition_error(e: impl std::fmt::Display) -> SttError {
    SttError::Recognition(e.to_string())
}

/// Reads a 16 kHz mono 16-bit WAV into normalized f32 samples.
fn read_samples(path: &Path) -> std::result::Result<Vec<f32>, SttError> {
    let reader = hound::WavReader::open(path).map_err(|e| SttError::Transcode(format!("unreadable wav: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE || spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(SttError::Transcode(format!(
            "expected 16 kHz mono 16-bit wav, got {} Hz, {} channel(s), {} bits",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        )));
    }

    reader
        .into_samples::<i16>()
        .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| SttError::Transcode(format!("corrupt wav: {e}")))
}
