//! Raw video in, captioned and branded video out.
//!
//! **captioner** transcribes a clip's speech with whisper.cpp, burns the
//! transcript in as timed captions, overlays an optional logo, appends an
//! optional outro clip and exports one file with stereo AAC audio. Decoding,
//! drawing and muxing are done by the `ffmpeg`/`ffprobe` command-line tools.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> captioner::Result<()> {
//! // Uses logo.png / outro.mp4 from the working directory when present.
//! let report = captioner::render_file("upload.mp4").await?;
//! println!("{} ({:.1}s)", report.output.display(), report.duration);
//! for warning in &report.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Each stage sits behind a trait ([`Prober`], [`Transcriber`], [`Renderer`],
//! [`ProgressSink`]) so [`Pipeline`] can run over any implementation.

pub mod assets;
pub(crate) mod audio;
pub mod caption;
pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub(crate) mod filter;
pub mod model;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod transcribe;
pub mod types;

pub use assets::AssetDirectory;
pub use config::{
    AudioProcessing, BrandingOptions, CaptionFailurePolicy, CaptionStyle, Corner, Language, LogoStyle, Model,
    OutputSpec, RenderOptions, TranscribeOptions,
};
pub use error::{Error, Result};
pub use export::{FfmpegRenderer, Renderer};
pub use pipeline::{Pipeline, PipelineState, RenderReport};
pub use probe::{FfprobeProber, Prober};
pub use progress::{LogProgress, NoProgress, Notice, ProgressSink, Stage};
pub use tools::Toolchain;
pub use transcribe::{Transcriber, WhisperTranscriber};
pub use types::{MediaClip, Segment, Transcript, Warning, Word};

use std::path::Path;

/// Render `path` with default options and tools found on `PATH`.
pub async fn render_file(path: impl AsRef<Path>) -> Result<RenderReport> {
    let toolchain = Toolchain::discover(None, None)?;
    toolchain.validate()?;
    render_file_with_options(path, &RenderOptions::default(), &toolchain, &LogProgress).await
}

/// Render `path` with custom options, an already validated toolchain and a
/// progress sink.
pub async fn render_file_with_options(
    path: impl AsRef<Path>,
    options: &RenderOptions,
    toolchain: &Toolchain,
    progress: &dyn ProgressSink,
) -> Result<RenderReport> {
    // The model may need downloading before the job can start.
    let transcriber = WhisperTranscriber::prepare(&options.transcribe, &toolchain.ffmpeg).await?;
    let prober = FfprobeProber::new(&toolchain.ffprobe);
    let renderer = FfmpegRenderer::new(&toolchain.ffmpeg);

    Pipeline::new(&prober, &transcriber, &renderer, options)
        .progress(progress)
        .run(path.as_ref())
}
