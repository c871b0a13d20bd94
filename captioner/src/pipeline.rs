//! The job driver.
//!
//! A run moves strictly forward through
//! `Idle → Loaded → Transcribing → CaptionsBuilt → Composited → Exported → Done`.
//! The first error moves it to `Failed` and nothing after that stage runs.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::assets::AssetDirectory;
use crate::caption::build_captions;
use crate::compose::{compose, LogoImage};
use crate::config::RenderOptions;
use crate::error::{Error, Result};
use crate::export::{export, Renderer, Timeline};
use crate::probe::Prober;
use crate::progress::{NoProgress, Notice, ProgressSink, Stage};
use crate::transcribe::Transcriber;
use crate::types::{Transcript, Warning};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Loaded,
    Transcribing,
    CaptionsBuilt,
    Composited,
    Exported,
    Done,
    /// `stage` names the step that was running when it failed.
    Failed { stage: &'static str, cause: String },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Loaded => "loaded",
            PipelineState::Transcribing => "transcribing",
            PipelineState::CaptionsBuilt => "captions built",
            PipelineState::Composited => "composited",
            PipelineState::Exported => "exported",
            PipelineState::Done => "done",
            PipelineState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed { stage, cause } => write!(f, "failed while {stage}: {cause}"),
            other => f.write_str(other.name()),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub output: PathBuf,
    /// Seconds, outro included.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Number of caption overlays burnt in.
    pub captions: usize,
    pub logo: Option<PathBuf>,
    pub outro: Option<PathBuf>,
    pub warnings: Vec<Warning>,
    pub transcript: Transcript,
}

impl RenderReport {
    /// The finished file's bytes, for handing to a download surface.
    pub fn read_output(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.output)?)
    }
}

/// One render job over injected collaborators.
pub struct Pipeline<'a> {
    prober: &'a dyn Prober,
    transcriber: &'a dyn Transcriber,
    renderer: &'a dyn Renderer,
    progress: &'a dyn ProgressSink,
    options: &'a RenderOptions,
    state: PipelineState,
    /// Step currently running, reported on failure.
    step: &'static str,
    warnings: Vec<Warning>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        prober: &'a dyn Prober,
        transcriber: &'a dyn Transcriber,
        renderer: &'a dyn Renderer,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            prober,
            transcriber,
            renderer,
            progress: &NoProgress,
            options,
            state: PipelineState::Idle,
            step: "loading",
            warnings: Vec::new(),
        }
    }

    pub fn progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run the job on `input`. A pipeline runs once.
    pub fn run(&mut self, input: &Path) -> Result<RenderReport> {
        if self.state != PipelineState::Idle {
            return Err(Error::InvalidOption(format!(
                "pipeline already ran (state: {})",
                self.state
            )));
        }

        match self.execute(input) {
            Ok(report) => {
                self.state = PipelineState::Done;
                info!(
                    output = %report.output.display(),
                    captions = report.captions,
                    warnings = report.warnings.len(),
                    "job done"
                );
                Ok(report)
            }
            Err(e) => {
                let stage = self.step;
                let cause = e.to_string();
                error!(stage, %cause, "job failed");
                self.progress.message(Notice::Failed {
                    stage: stage.to_string(),
                    cause: cause.clone(),
                });
                self.state = PipelineState::Failed { stage, cause };
                Err(e)
            }
        }
    }

    fn advance(&mut self, state: PipelineState, stage: Stage) {
        debug!(from = self.state.name(), to = state.name(), "state change");
        self.state = state;
        self.progress.stage(stage, stage.percent());
    }

    fn begin(&mut self, step: &'static str) {
        debug!(step, "starting");
        self.step = step;
    }

    fn warn(&mut self, warning: Warning) {
        self.progress.message(Notice::Warning(warning.clone()));
        self.warnings.push(warning);
    }

    fn execute(&mut self, input: &Path) -> Result<RenderReport> {
        let options = self.options;

        self.begin("loading");
        let clip = self.prober.probe(input)?;
        self.advance(PipelineState::Loaded, Stage::Loaded);
        let assets = AssetDirectory::scan(&options.branding.asset_dir);

        self.begin("transcribing");
        self.advance(PipelineState::Transcribing, Stage::Transcribing);
        let transcript = if clip.has_audio() {
            self.transcriber.transcribe(&clip)?
        } else {
            self.warn(Warning::SilentSource);
            Transcript {
                segments: Vec::new(),
                language: "unknown".into(),
                duration: clip.duration,
                model: options.transcribe.model.name().to_string(),
            }
        };
        info!(segments = transcript.segments.len(), language = %transcript.language, "transcript ready");

        self.begin("building captions");
        let captions = build_captions(
            &transcript.segments,
            &clip,
            &options.captions,
            options.caption_failures,
        )?;
        for warning in captions.warnings {
            self.warn(warning);
        }
        let caption_count = captions.overlays.len();
        self.advance(PipelineState::CaptionsBuilt, Stage::CaptionsBuilt);

        self.begin("compositing");
        let logo_path = match &options.branding.logo_candidates {
            Some(candidates) => {
                let found = assets.resolve(candidates);
                if found.is_none() {
                    self.warn(Warning::MissingLogo);
                }
                found
            }
            None => None,
        };
        let logo = logo_path.as_deref().map(LogoImage::open).transpose()?;
        let composition = compose(&clip, captions.overlays, logo.as_ref(), &options.captions, &options.logo);
        self.advance(PipelineState::Composited, Stage::Composited);

        self.begin("sequencing");
        let outro_path = match &options.branding.outro_candidates {
            Some(candidates) => {
                let found = assets.resolve(candidates);
                if found.is_none() {
                    self.warn(Warning::MissingOutro);
                }
                found
            }
            None => None,
        };
        let outro = outro_path.as_deref().map(|p| self.prober.probe(p)).transpose()?;
        let timeline = Timeline::new(composition, outro);
        self.progress.stage(Stage::Sequenced, Stage::Sequenced.percent());

        self.begin("exporting");
        let summary = export(&timeline, &options.output, self.renderer)?;
        self.advance(PipelineState::Exported, Stage::Exported);

        Ok(RenderReport {
            output: summary.path,
            duration: summary.duration,
            width: summary.width,
            height: summary.height,
            frame_rate: summary.frame_rate,
            captions: caption_count,
            logo: logo_path,
            outro: outro_path,
            warnings: std::mem::take(&mut self.warnings),
            transcript,
        })
    }
}
