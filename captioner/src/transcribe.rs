use std::path::{Path, PathBuf};

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{self, WHISPER_SAMPLE_RATE};
use crate::config::{Language, TranscribeOptions};
use crate::error::{Error, Result};
use crate::model;
use crate::types::{MediaClip, Segment, Transcript, Word};

/// Speech recognition over a probed clip.
pub trait Transcriber {
    fn transcribe(&self, clip: &MediaClip) -> Result<Transcript>;
}

/// whisper.cpp through whisper-rs. The speech track is decoded with ffmpeg.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    model_path: PathBuf,
    ffmpeg: PathBuf,
    options: TranscribeOptions,
}

impl WhisperTranscriber {
    pub fn new(model_path: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>, options: TranscribeOptions) -> Self {
        Self {
            model_path: model_path.into(),
            ffmpeg: ffmpeg.into(),
            options,
        }
    }

    /// Make sure the configured model is on disk, downloading it if needed.
    pub async fn prepare(options: &TranscribeOptions, ffmpeg: &Path) -> Result<Self> {
        let cache_dir = options.resolve_cache_dir();
        let model_path = model::ensure_model(&options.model, &cache_dir).await?;
        Ok(Self::new(model_path, ffmpeg, options.clone()))
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, clip: &MediaClip) -> Result<Transcript> {
        let Some(track) = clip.audio.as_deref() else {
            return Ok(Transcript {
                segments: Vec::new(),
                language: "unknown".into(),
                duration: 0.0,
                model: self.options.model.name().to_string(),
            });
        };
        let samples = audio::load_audio(&self.ffmpeg, &clip.path, track, &self.options.audio_processing)?;
        transcribe_samples(&samples, &self.model_path, &self.options)
    }
}

/// Run whisper over 16 kHz mono samples.
pub fn transcribe_samples(samples: &[f32], model_path: &Path, options: &TranscribeOptions) -> Result<Transcript> {
    info!(model = %model_path.display(), "loading whisper model");

    let mut ctx_params = WhisperContextParameters::new();
    ctx_params.use_gpu(options.gpu);
    ctx_params.gpu_device(options.gpu_device as i32);

    let model = model_path
        .to_str()
        .ok_or_else(|| Error::Model("model path contains invalid UTF-8".into()))?;
    let ctx = WhisperContext::new_with_params(model, ctx_params)?;
    let mut state = ctx.create_state()?;

    let mut params = match options.beam_size {
        Some(beam_size) => FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: beam_size as i32,
            patience: -1.0,
        }),
        None => FullParams::new(SamplingStrategy::Greedy { best_of: 5 }),
    };

    match &options.language {
        Language::Auto => params.set_detect_language(true),
        Language::Code { code, .. } => params.set_language(Some(code)),
    }
    params.set_translate(options.translate);
    params.set_token_timestamps(options.word_timestamps);
    params.set_temperature(options.temperature);
    if let Some(n) = options.n_threads {
        params.set_n_threads(n as i32);
    }
    if options.vad {
        params.enable_vad(true);
    }

    // whisper.cpp prints to stderr unless told otherwise
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    info!(samples = samples.len(), "running transcription");
    state
        .full(params, samples)
        .map_err(|e| Error::Transcription(e.to_string()))?;

    let n_segments = state.full_n_segments();
    debug!(n_segments, "transcription complete");

    let mut segments = Vec::with_capacity(n_segments.max(0) as usize);
    for i in 0..n_segments {
        let segment = state
            .get_segment(i)
            .ok_or_else(|| Error::Transcription(format!("segment {i} not found")))?;

        let text = segment
            .to_str_lossy()
            .map_err(|e| Error::Transcription(format!("segment text error: {e}")))?
            .into_owned();

        let words = options.word_timestamps.then(|| {
            (0..segment.n_tokens())
                .filter_map(|t| segment.get_token(t))
                .filter_map(|token| {
                    let text = token.to_str_lossy().ok()?.into_owned();
                    if is_special_token(&text) {
                        return None;
                    }
                    let data = token.token_data();
                    Some(Word {
                        text,
                        start: centiseconds(data.t0),
                        end: centiseconds(data.t1),
                        probability: data.p,
                    })
                })
                .collect()
        });

        segments.push(Segment {
            start: centiseconds(segment.start_timestamp()),
            end: centiseconds(segment.end_timestamp()),
            text,
            no_speech_probability: segment.no_speech_probability(),
            words,
        });
    }

    let language = whisper_rs::get_lang_str(state.full_lang_id_from_state())
        .unwrap_or("unknown")
        .to_string();

    Ok(Transcript {
        segments,
        language,
        duration: samples.len() as f64 / WHISPER_SAMPLE_RATE as f64,
        model: options.model.name().to_string(),
    })
}

/// whisper timestamps are in units of 10 ms.
fn centiseconds(ts: i64) -> f64 {
    ts as f64 / 100.0
}

/// Markers like `[_BEG_]` or `<|en|>` are not words.
fn is_special_token(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with('<')
}
