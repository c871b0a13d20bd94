use std::fmt;
use std::path::PathBuf;

use crate::error::Error;

/// A validated language for whisper transcription.
///
/// Accepts both short codes ("en", "es") and full names ("english",
/// "spanish"). `Language::Auto` lets whisper detect the spoken language.
#[derive(Debug, Clone, Default)]
pub enum Language {
    #[default]
    Auto,
    Code {
        /// Short code as whisper expects it.
        code: String,
        /// Whisper internal language ID.
        id: i32,
    },
}

impl Language {
    /// Create a language from a code or full name, validating against whisper.cpp.
    pub fn new(lang: &str) -> Result<Self, Error> {
        let lower = lang.trim().to_lowercase();
        if lower == "auto" {
            return Ok(Language::Auto);
        }

        match whisper_rs::get_lang_id(&lower) {
            Some(id) => {
                let code = whisper_rs::get_lang_str(id).unwrap_or(&lower).to_string();
                Ok(Language::Code { code, id })
            }
            None => Err(Error::UnsupportedLanguage(lang.to_string())),
        }
    }

    /// Short language code, or None for auto-detection.
    pub fn code(&self) -> Option<&str> {
        match self {
            Language::Auto => None,
            Language::Code { code, .. } => Some(code),
        }
    }

    /// All supported languages as (code, full_name) pairs.
    pub fn supported() -> Vec<(&'static str, &'static str)> {
        let max = whisper_rs::get_lang_max_id();
        (0..=max)
            .filter_map(|id| {
                let code = whisper_rs::get_lang_str(id)?;
                let name = whisper_rs::get_lang_str_full(id)?;
                Some((code, name))
            })
            .collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Auto => write!(f, "auto"),
            Language::Code { code, .. } => write!(f, "{code}"),
        }
    }
}

/// Whisper model sizes.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Tiny,
    TinyEn,
    Base,
    BaseEn,
    Small,
    SmallEn,
    Medium,
    MediumEn,
    LargeV2,
    LargeV3,
    LargeV3Turbo,
    /// User-provided ggml file.
    Custom(PathBuf),
}

/// Every named model with its approximate download size.
pub const MODEL_SIZES: &[(&str, &str)] = &[
    ("tiny", "75 MB"),
    ("tiny.en", "75 MB"),
    ("base", "142 MB"),
    ("base.en", "142 MB"),
    ("small", "466 MB"),
    ("small.en", "466 MB"),
    ("medium", "1.5 GB"),
    ("medium.en", "1.5 GB"),
    ("large-v2", "2.9 GB"),
    ("large-v3", "2.9 GB"),
    ("large-v3-turbo", "~1.6 GB"),
];

impl Model {
    /// Filename used by the whisper.cpp model repository.
    pub fn filename(&self) -> String {
        match self {
            Model::Custom(path) => path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "custom-model".into()),
            named => format!("ggml-{}.bin", named.name()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Model::Tiny => "tiny",
            Model::TinyEn => "tiny.en",
            Model::Base => "base",
            Model::BaseEn => "base.en",
            Model::Small => "small",
            Model::SmallEn => "small.en",
            Model::Medium => "medium",
            Model::MediumEn => "medium.en",
            Model::LargeV2 => "large-v2",
            Model::LargeV3 => "large-v3",
            Model::LargeV3Turbo => "large-v3-turbo",
            Model::Custom(_) => "custom",
        }
    }

    /// Parse a model name as given on the command line.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "tiny" => Some(Model::Tiny),
            "tiny.en" => Some(Model::TinyEn),
            "base" => Some(Model::Base),
            "base.en" => Some(Model::BaseEn),
            "small" => Some(Model::Small),
            "small.en" => Some(Model::SmallEn),
            "medium" => Some(Model::Medium),
            "medium.en" => Some(Model::MediumEn),
            "large-v2" => Some(Model::LargeV2),
            "large-v3" => Some(Model::LargeV3),
            "large-v3-turbo" => Some(Model::LargeV3Turbo),
            _ => None,
        }
    }
}

/// Audio conditioning applied before recognition. Both steps are off by default.
///
/// Samples are never trimmed; segment times must stay on the video's clock.
#[derive(Debug, Clone, Default)]
pub struct AudioProcessing {
    /// Subtract the sample mean.
    pub dc_offset_removal: bool,
    /// Peak-normalize samples to [-1.0, 1.0].
    pub normalize: bool,
}

impl AudioProcessing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dc_offset_removal(mut self, enabled: bool) -> Self {
        self.dc_offset_removal = enabled;
        self
    }

    pub fn normalize(mut self, enabled: bool) -> Self {
        self.normalize = enabled;
        self
    }
}

/// Whisper options for the caption transcription.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub model: Model,
    pub language: Language,
    pub translate: bool,
    /// Attach per-word timings to each segment.
    pub word_timestamps: bool,
    pub n_threads: Option<u32>,
    pub gpu: bool,
    pub gpu_device: u32,
    pub vad: bool,
    pub temperature: f32,
    pub beam_size: Option<u32>,
    pub cache_dir: Option<PathBuf>,
    pub audio_processing: AudioProcessing,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: Model::Tiny,
            language: Language::Auto,
            translate: false,
            word_timestamps: false,
            n_threads: None,
            gpu: true,
            gpu_device: 0,
            vad: false,
            temperature: 0.0,
            beam_size: None,
            cache_dir: None,
            audio_processing: AudioProcessing::default(),
        }
    }
}

impl TranscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Set the language. Accepts codes ("en") or full names ("english").
    pub fn language(mut self, lang: &str) -> Result<Self, Error> {
        self.language = Language::new(lang)?;
        Ok(self)
    }

    pub fn translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn word_timestamps(mut self, enabled: bool) -> Self {
        self.word_timestamps = enabled;
        self
    }

    pub fn n_threads(mut self, n: u32) -> Result<Self, Error> {
        if n == 0 {
            return Err(Error::InvalidOption("thread count must be at least 1".into()));
        }
        self.n_threads = Some(n);
        Ok(self)
    }

    pub fn gpu(mut self, enabled: bool) -> Self {
        self.gpu = enabled;
        self
    }

    pub fn gpu_device(mut self, device: u32) -> Self {
        self.gpu_device = device;
        self
    }

    pub fn vad(mut self, enabled: bool) -> Self {
        self.vad = enabled;
        self
    }

    pub fn temperature(mut self, temp: f32) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&temp) {
            return Err(Error::InvalidOption(format!(
                "temperature must be between 0.0 and 1.0, got {temp}"
            )));
        }
        self.temperature = temp;
        Ok(self)
    }

    pub fn beam_size(mut self, size: u32) -> Result<Self, Error> {
        if !(1..=16).contains(&size) {
            return Err(Error::InvalidOption(format!(
                "beam size must be between 1 and 16, got {size}"
            )));
        }
        self.beam_size = Some(size);
        Ok(self)
    }

    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    pub fn audio_processing(mut self, ap: AudioProcessing) -> Self {
        self.audio_processing = ap;
        self
    }

    /// Resolve the model cache directory, defaulting to ~/.cache/captioner/models.
    pub fn resolve_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("captioner")
                .join("models")
        })
    }
}

/// What to do when a single segment cannot become a caption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptionFailurePolicy {
    /// Fail the whole job.
    #[default]
    Abort,
    /// Drop the caption and report a warning.
    Skip,
}

/// Caption layout and look. Sizes are fractions of the base clip so the
/// captions scale with resolution.
#[derive(Debug, Clone)]
pub struct CaptionStyle {
    /// Font size as a fraction of the clip height.
    pub font_fraction: f64,
    /// Auto-fit never shrinks the font below this fraction of the clip height.
    pub min_font_fraction: f64,
    /// Text box width as a fraction of the clip width.
    pub width_fraction: f64,
    /// Top of the caption block as a fraction of the clip height.
    pub y_fraction: f64,
    /// Auto-fit shrinks the font until the text fits in this many lines.
    pub max_lines: usize,
    /// Average glyph advance relative to the font size, used for wrapping.
    pub glyph_width_ratio: f64,
    /// Line height relative to the font size.
    pub line_spacing: f64,
    pub font_color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    /// Opacity of a black backing plate behind each line; None draws no plate.
    pub box_opacity: Option<f64>,
    /// TrueType/OpenType file handed to drawtext; None uses fontconfig's default.
    pub font_file: Option<PathBuf>,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_fraction: 0.05,
            min_font_fraction: 0.03,
            width_fraction: 0.9,
            y_fraction: 0.85,
            max_lines: 3,
            glyph_width_ratio: 0.55,
            line_spacing: 1.2,
            font_color: "white".into(),
            stroke_color: "black".into(),
            stroke_width: 2,
            box_opacity: None,
            font_file: None,
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<f64, Error> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(Error::InvalidOption(format!(
            "{name} must be a fraction in (0, 1], got {value}"
        )))
    }
}

impl CaptionStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn font_fraction(mut self, fraction: f64) -> Result<Self, Error> {
        self.font_fraction = check_fraction("font fraction", fraction)?;
        self.min_font_fraction = self.min_font_fraction.min(self.font_fraction);
        Ok(self)
    }

    pub fn width_fraction(mut self, fraction: f64) -> Result<Self, Error> {
        self.width_fraction = check_fraction("caption width fraction", fraction)?;
        Ok(self)
    }

    pub fn y_fraction(mut self, fraction: f64) -> Result<Self, Error> {
        self.y_fraction = check_fraction("caption position", fraction)?;
        Ok(self)
    }

    pub fn max_lines(mut self, lines: usize) -> Result<Self, Error> {
        if lines == 0 {
            return Err(Error::InvalidOption("max lines must be at least 1".into()));
        }
        self.max_lines = lines;
        Ok(self)
    }

    pub fn box_opacity(mut self, opacity: Option<f64>) -> Result<Self, Error> {
        if let Some(o) = opacity {
            check_fraction("box opacity", o)?;
        }
        self.box_opacity = opacity;
        Ok(self)
    }

    pub fn stroke_width(mut self, width: u32) -> Self {
        self.stroke_width = width;
        self
    }

    pub fn font_file(mut self, path: PathBuf) -> Self {
        self.font_file = Some(path);
        self
    }
}

/// Frame corner a logo is pinned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Logo placement.
#[derive(Debug, Clone)]
pub struct LogoStyle {
    /// Logo height as a fraction of the clip height.
    pub height_fraction: f64,
    /// Empty space between the logo and the frame edges, in pixels.
    pub margin: u32,
    pub corner: Corner,
}

impl Default for LogoStyle {
    fn default() -> Self {
        Self {
            height_fraction: 0.12,
            margin: 20,
            corner: Corner::TopRight,
        }
    }
}

impl LogoStyle {
    pub fn height_fraction(mut self, fraction: f64) -> Result<Self, Error> {
        self.height_fraction = check_fraction("logo height fraction", fraction)?;
        Ok(self)
    }

    pub fn margin(mut self, px: u32) -> Self {
        self.margin = px;
        self
    }

    pub fn corner(mut self, corner: Corner) -> Self {
        self.corner = corner;
        self
    }
}

pub const DEFAULT_LOGO_CANDIDATES: &[&str] = &["logo.png", "Logo.png", "LOGO.png"];
pub const DEFAULT_OUTRO_CANDIDATES: &[&str] = &["outro.mp4", "Outro.mp4", "OUTRO.mp4"];

/// Where to look for branding assets and which names to try, in priority order.
///
/// A `None` candidate list turns that lookup off entirely; its absence is
/// then not reported.
#[derive(Debug, Clone)]
pub struct BrandingOptions {
    pub asset_dir: PathBuf,
    pub logo_candidates: Option<Vec<String>>,
    pub outro_candidates: Option<Vec<String>>,
}

impl Default for BrandingOptions {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("."),
            logo_candidates: Some(DEFAULT_LOGO_CANDIDATES.iter().map(|s| s.to_string()).collect()),
            outro_candidates: Some(DEFAULT_OUTRO_CANDIDATES.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl BrandingOptions {
    pub fn new(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            ..Self::default()
        }
    }

    pub fn logo_candidates(mut self, names: Option<Vec<String>>) -> Self {
        self.logo_candidates = names;
        self
    }

    pub fn outro_candidates(mut self, names: Option<Vec<String>>) -> Self {
        self.outro_candidates = names;
        self
    }
}

/// Encoding parameters for the final file.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub path: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    /// Forced channel count; some players reject the source's layout.
    pub audio_channels: u32,
    pub audio_sample_rate: u32,
    pub audio_bitrate: String,
    /// None keeps the source frame rate (30 when unknown).
    pub frame_rate: Option<f64>,
    pub preset: String,
    pub pixel_format: String,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            path: PathBuf::from("video_final.mp4"),
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
            audio_channels: 2,
            audio_sample_rate: 48_000,
            audio_bitrate: "192k".into(),
            frame_rate: None,
            preset: "ultrafast".into(),
            pixel_format: "yuv420p".into(),
        }
    }
}

impl OutputSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn frame_rate(mut self, fps: f64) -> Result<Self, Error> {
        if !fps.is_finite() || fps <= 0.0 || fps > 240.0 {
            return Err(Error::InvalidOption(format!(
                "frame rate must be in (0, 240], got {fps}"
            )));
        }
        self.frame_rate = Some(fps);
        Ok(self)
    }

    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    pub fn audio_channels(mut self, channels: u32) -> Result<Self, Error> {
        if !(1..=8).contains(&channels) {
            return Err(Error::InvalidOption(format!(
                "audio channels must be between 1 and 8, got {channels}"
            )));
        }
        self.audio_channels = channels;
        Ok(self)
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }
}

/// Everything one render job needs.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub transcribe: TranscribeOptions,
    pub captions: CaptionStyle,
    pub caption_failures: CaptionFailurePolicy,
    pub logo: LogoStyle,
    pub branding: BrandingOptions,
    pub output: OutputSpec,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcribe(mut self, opts: TranscribeOptions) -> Self {
        self.transcribe = opts;
        self
    }

    pub fn captions(mut self, style: CaptionStyle) -> Self {
        self.captions = style;
        self
    }

    pub fn caption_failures(mut self, policy: CaptionFailurePolicy) -> Self {
        self.caption_failures = policy;
        self
    }

    pub fn logo(mut self, style: LogoStyle) -> Self {
        self.logo = style;
        self
    }

    pub fn branding(mut self, branding: BrandingOptions) -> Self {
        self.branding = branding;
        self
    }

    pub fn output(mut self, output: OutputSpec) -> Self {
        self.output = output;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_filenames() {
        assert_eq!(Model::Tiny.filename(), "ggml-tiny.bin");
        assert_eq!(Model::LargeV3Turbo.filename(), "ggml-large-v3-turbo.bin");
        assert_eq!(
            Model::Custom(PathBuf::from("/models/my.bin")).filename(),
            "my.bin"
        );
    }

    #[test]
    fn test_every_listed_model_parses() {
        for (name, _) in MODEL_SIZES {
            let model = Model::parse_name(name).unwrap();
            assert_eq!(model.name(), *name);
        }
        assert!(Model::parse_name("huge").is_none());
    }

    #[test]
    fn test_language_auto() {
        let lang = Language::new("AUTO").unwrap();
        assert!(lang.code().is_none());
        assert_eq!(lang.to_string(), "auto");
    }

    #[test]
    fn test_language_rejects_unknown() {
        assert!(matches!(
            Language::new("klingon"),
            Err(Error::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_transcribe_option_validation() {
        assert!(TranscribeOptions::new().temperature(1.5).is_err());
        assert!(TranscribeOptions::new().beam_size(0).is_err());
        assert!(TranscribeOptions::new().n_threads(0).is_err());
        let opts = TranscribeOptions::new().beam_size(5).unwrap();
        assert_eq!(opts.beam_size, Some(5));
    }

    #[test]
    fn test_cache_dir_override() {
        let opts = TranscribeOptions::new().cache_dir(PathBuf::from("/tmp/models"));
        assert_eq!(opts.resolve_cache_dir(), PathBuf::from("/tmp/models"));
        let default = TranscribeOptions::new().resolve_cache_dir();
        assert!(default.ends_with("captioner/models"));
    }

    #[test]
    fn test_caption_style_fractions_validated() {
        assert!(CaptionStyle::new().font_fraction(0.0).is_err());
        assert!(CaptionStyle::new().y_fraction(1.2).is_err());
        assert!(CaptionStyle::new().box_opacity(Some(f64::NAN)).is_err());
        assert!(CaptionStyle::new().max_lines(0).is_err());
        let style = CaptionStyle::new().font_fraction(0.02).unwrap();
        assert!(style.min_font_fraction <= style.font_fraction);
    }

    #[test]
    fn test_default_branding_candidates_in_priority_order() {
        let branding = BrandingOptions::default();
        assert_eq!(
            branding.outro_candidates.unwrap(),
            vec!["outro.mp4", "Outro.mp4", "OUTRO.mp4"]
        );
        assert_eq!(branding.logo_candidates.unwrap()[0], "logo.png");
    }

    #[test]
    fn test_output_spec_defaults_force_stereo_aac() {
        let spec = OutputSpec::default();
        assert_eq!(spec.audio_codec, "aac");
        assert_eq!(spec.audio_channels, 2);
        assert_eq!(spec.video_codec, "libx264");
        assert!(OutputSpec::default().frame_rate(0.0).is_err());
        assert!(OutputSpec::default().audio_channels(0).is_err());
    }
}
