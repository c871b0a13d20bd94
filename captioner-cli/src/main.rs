use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use captioner::config::MODEL_SIZES;
use captioner::{
    AssetDirectory, AudioProcessing, BrandingOptions, CaptionFailurePolicy, CaptionStyle, Corner, Language,
    LogoStyle, Model, Notice, OutputSpec, ProgressSink, RenderOptions, Stage, Toolchain, TranscribeOptions,
};

#[derive(Parser)]
#[command(name = "captioner", about = "Burn captions, a logo and an outro into a video")]
struct Cli {
    /// Video file to caption.
    #[arg(required_unless_present_any = ["list_models", "download_model", "list_languages", "list_assets", "check_tools"])]
    input: Option<PathBuf>,

    /// Where to write the finished video.
    #[arg(short, long, default_value = "video_final.mp4")]
    output: PathBuf,

    /// Whisper model name, or a path to a ggml file.
    #[arg(short, long, default_value = "tiny")]
    model: String,

    /// Language code (e.g. "en", "de") or "auto" for detection.
    #[arg(short, long, default_value = "auto")]
    language: String,

    /// Translate speech to English captions.
    #[arg(long)]
    translate: bool,

    /// Disable GPU acceleration.
    #[arg(long)]
    no_gpu: bool,

    /// GPU device ID.
    #[arg(long, default_value = "0")]
    gpu_device: u32,

    /// Number of threads (default: auto).
    #[arg(long)]
    threads: Option<u32>,

    /// Enable whisper's voice activity detection.
    #[arg(long)]
    vad: bool,

    /// Sampling temperature.
    #[arg(long, default_value = "0.0")]
    temperature: f32,

    /// Beam search size (default: greedy).
    #[arg(long)]
    beam_size: Option<u32>,

    /// Model cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Enable DC offset removal before recognition.
    #[arg(long)]
    dc_offset: bool,

    /// Enable peak normalization before recognition.
    #[arg(long)]
    normalize: bool,

    /// Directory searched for logo and outro files.
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    /// Do not look for a logo.
    #[arg(long)]
    no_logo: bool,

    /// Do not look for an outro.
    #[arg(long)]
    no_outro: bool,

    /// Corner the logo is pinned to.
    #[arg(long, default_value = "top-right")]
    logo_corner: CornerArg,

    /// Font file for the captions (default: fontconfig's choice).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Caption font size as a fraction of the video height.
    #[arg(long, default_value = "0.05")]
    font_size: f64,

    /// Caption top edge as a fraction of the video height.
    #[arg(long, default_value = "0.85")]
    caption_position: f64,

    /// Opacity of a dark box behind the captions (0-1).
    #[arg(long)]
    caption_box: Option<f64>,

    /// Drop captions with unusable timing instead of failing.
    #[arg(long)]
    skip_bad_captions: bool,

    /// Output frame rate (default: keep the source's).
    #[arg(long)]
    fps: Option<f64>,

    /// Also write the transcript to this file.
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Format of the --transcript file.
    #[arg(long, default_value = "srt")]
    transcript_format: TranscriptFormat,

    /// Attach word timings to the JSON transcript.
    #[arg(long)]
    word_timestamps: bool,

    /// ffmpeg executable (default: search PATH).
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe executable (default: search PATH).
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Show the asset directory and which branding files would be used.
    #[arg(long)]
    list_assets: bool,

    /// Show the ffmpeg/ffprobe in use and whether they can draw text.
    #[arg(long)]
    check_tools: bool,

    /// List available models.
    #[arg(long)]
    list_models: bool,

    /// Download a model without rendering.
    #[arg(long)]
    download_model: Option<String>,

    /// List supported languages.
    #[arg(long)]
    list_languages: bool,
}

#[derive(Clone, ValueEnum)]
enum TranscriptFormat {
    Text,
    Srt,
    Vtt,
    Json,
}

#[derive(Clone, ValueEnum)]
enum CornerArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl From<CornerArg> for Corner {
    fn from(arg: CornerArg) -> Self {
        match arg {
            CornerArg::TopLeft => Corner::TopLeft,
            CornerArg::TopRight => Corner::TopRight,
            CornerArg::BottomLeft => Corner::BottomLeft,
            CornerArg::BottomRight => Corner::BottomRight,
        }
    }
}

/// Terminal progress bar over the pipeline checkpoints.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn stage(&self, stage: Stage, percent: u8) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(stage.to_string());
        if stage == Stage::Exported {
            self.bar.finish_with_message("done");
        }
    }

    fn message(&self, notice: Notice) {
        match notice {
            Notice::Warning(w) => self.bar.println(format!("warning: {w}")),
            Notice::Failed { stage, .. } => self.bar.abandon_with_message(format!("failed while {stage}")),
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("captioner=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.list_languages {
        println!("{:<6} LANGUAGE", "CODE");
        println!("{:<6} --------", "----");
        for (code, name) in Language::supported() {
            println!("{code:<6} {name}");
        }
        return;
    }

    if cli.list_models {
        println!("{:<16} SIZE", "MODEL");
        println!("{:<16} ----", "-----");
        for (name, size) in MODEL_SIZES {
            println!("{name:<16} {size}");
        }

        let cache_dir = cli
            .cache_dir
            .clone()
            .unwrap_or_else(|| TranscribeOptions::default().resolve_cache_dir());
        let cached = captioner::model::list_cached_models(&cache_dir);
        if !cached.is_empty() {
            println!("\nCached models in {}:", cache_dir.display());
            for path in cached {
                let size = std::fs::metadata(&path)
                    .map(|m| format_bytes(m.len()))
                    .unwrap_or_default();
                println!(
                    "  {} ({size})",
                    path.file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_default()
                );
            }
        }
        return;
    }

    if let Some(model_name) = &cli.download_model {
        let Some(model) = Model::parse_name(model_name) else {
            eprintln!("Unknown model: {model_name}");
            eprintln!("Use --list-models to see available models");
            std::process::exit(1);
        };
        let cache_dir = cli
            .cache_dir
            .clone()
            .unwrap_or_else(|| TranscribeOptions::default().resolve_cache_dir());
        match captioner::model::ensure_model(&model, &cache_dir).await {
            Ok(path) => println!("Model ready: {}", path.display()),
            Err(e) => fail(e),
        }
        return;
    }

    if cli.list_assets {
        list_assets(&cli);
        return;
    }

    let toolchain = match Toolchain::discover(cli.ffmpeg.as_deref(), cli.ffprobe.as_deref()) {
        Ok(t) => t,
        Err(e) => fail(e),
    };

    if cli.check_tools {
        for info in toolchain.describe() {
            println!(
                "{:<8} {}  {}",
                info.name,
                info.path.display(),
                info.version.as_deref().unwrap_or("(no version output)")
            );
        }
        match toolchain.validate() {
            Ok(()) => println!("drawtext filter: available"),
            Err(e) => fail(e),
        }
        return;
    }

    if let Err(e) = toolchain.validate() {
        fail(e);
    }

    let Some(input) = cli.input.clone() else {
        fail("no input video given");
    };
    let options = match build_options(&cli) {
        Ok(o) => o,
        Err(e) => fail(e),
    };

    let progress = BarProgress::new();
    let report = match captioner::render_file_with_options(&input, &options, &toolchain, &progress).await {
        Ok(r) => r,
        Err(e) => fail(e),
    };

    eprintln!(
        "Render complete: {:.1}s at {}x{}, {} captions, language: {}",
        report.duration,
        report.width,
        report.height,
        report.captions,
        report.transcript.language,
    );
    eprintln!("Written to {}", report.output.display());

    if let Some(path) = &cli.transcript {
        let text = match cli.transcript_format {
            TranscriptFormat::Text => report.transcript.text(),
            TranscriptFormat::Srt => report.transcript.to_srt(),
            TranscriptFormat::Vtt => report.transcript.to_vtt(),
            TranscriptFormat::Json => match report.transcript.to_json_pretty() {
                Ok(j) => j,
                Err(e) => fail(e),
            },
        };
        if let Err(e) = std::fs::write(path, text) {
            fail(format!("writing {}: {e}", path.display()));
        }
        eprintln!("Transcript written to {}", path.display());
    }
}

fn build_options(cli: &Cli) -> captioner::Result<RenderOptions> {
    let model = match Model::parse_name(&cli.model) {
        Some(m) => m,
        None => {
            let path = PathBuf::from(&cli.model);
            if !path.exists() {
                return Err(captioner::Error::InvalidOption(format!(
                    "unknown model {}; use --list-models or give a path to a ggml file",
                    cli.model
                )));
            }
            Model::Custom(path)
        }
    };

    let mut transcribe = TranscribeOptions::new()
        .model(model)
        .language(&cli.language)?
        .translate(cli.translate)
        .word_timestamps(cli.word_timestamps)
        .gpu(!cli.no_gpu)
        .gpu_device(cli.gpu_device)
        .vad(cli.vad)
        .temperature(cli.temperature)?
        .audio_processing(
            AudioProcessing::new()
                .dc_offset_removal(cli.dc_offset)
                .normalize(cli.normalize),
        );
    if let Some(n) = cli.threads {
        transcribe = transcribe.n_threads(n)?;
    }
    if let Some(size) = cli.beam_size {
        transcribe = transcribe.beam_size(size)?;
    }
    if let Some(dir) = &cli.cache_dir {
        transcribe = transcribe.cache_dir(dir.clone());
    }

    let mut captions = CaptionStyle::new()
        .font_fraction(cli.font_size)?
        .y_fraction(cli.caption_position)?
        .box_opacity(cli.caption_box)?;
    if let Some(font) = &cli.font {
        captions = captions.font_file(font.clone());
    }

    let mut output = OutputSpec::new(&cli.output);
    if let Some(fps) = cli.fps {
        output = output.frame_rate(fps)?;
    }

    Ok(RenderOptions::new()
        .transcribe(transcribe)
        .captions(captions)
        .caption_failures(if cli.skip_bad_captions {
            CaptionFailurePolicy::Skip
        } else {
            CaptionFailurePolicy::Abort
        })
        .logo(LogoStyle::default().corner(cli.logo_corner.clone().into()))
        .branding(branding(cli))
        .output(output))
}

fn branding(cli: &Cli) -> BrandingOptions {
    let mut branding = BrandingOptions::new(&cli.assets);
    if cli.no_logo {
        branding = branding.logo_candidates(None);
    }
    if cli.no_outro {
        branding = branding.outro_candidates(None);
    }
    branding
}

fn list_assets(cli: &Cli) {
    let dir = AssetDirectory::scan(&cli.assets);
    println!("Files in {}:", dir.root().display());
    for name in dir.entries() {
        println!("  {name}");
    }

    let branding = branding(cli);
    let report = |label: &str, candidates: Option<&Vec<String>>| match candidates {
        None => println!("{label:<6} disabled"),
        Some(names) => match dir.resolve(names) {
            Some(path) => println!("{label:<6} {}", path.display()),
            None => println!("{label:<6} none of {}", names.join(", ")),
        },
    };
    println!();
    report("logo:", branding.logo_candidates.as_ref());
    report("outro:", branding.outro_candidates.as_ref());
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.0} MB", bytes as f64 / 1_000_000.0)
    } else {
        format!("{:.0} KB", bytes as f64 / 1_000.0)
    }
}
