//! Sequencing and final render.
//!
//! The composed clip and an optional outro become one ffmpeg invocation: a
//! filtergraph burns the captions, overlays the logo, conforms the outro to
//! the primary frame and concatenates both segments with their own audio.
//! Output goes to a `.partial` file that is renamed into place only after
//! ffmpeg succeeds.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::compose::{even, Composition, OverlayContent};
use crate::config::OutputSpec;
use crate::error::{Error, Result};
use crate::filter::{self, FilterGraph};
use crate::tools::{stderr_excerpt, ToolCommand};
use crate::types::MediaClip;

/// Used when neither the output spec nor the source names a frame rate.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Runs a fully built ffmpeg argument list.
pub trait Renderer {
    fn render(&self, args: &[OsString]) -> Result<()>;
}

/// The ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    ffmpeg: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Renderer for FfmpegRenderer {
    fn render(&self, args: &[OsString]) -> Result<()> {
        let output = ToolCommand::new(&self.ffmpeg).args(args).run()?;
        if !output.status.success() {
            return Err(Error::Export(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_excerpt(&output)
            )));
        }
        Ok(())
    }
}

/// How the outro is conformed to the primary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Scaled height already matches.
    Exact,
    /// Scaled height is shorter; letterbox to the primary height.
    Pad,
    /// Scaled height is taller; crop the centre.
    Crop,
}

/// An outro resized to the primary width.
#[derive(Debug, Clone)]
pub struct OutroSegment {
    pub clip: MediaClip,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub fit: Fit,
}

/// Primary composition followed by an optional outro.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub primary: Composition,
    pub outro: Option<OutroSegment>,
}

impl Timeline {
    pub fn new(primary: Composition, outro: Option<MediaClip>) -> Self {
        let outro = outro.map(|clip| {
            let scaled_width = primary.width();
            let scaled_height = even((scaled_width as f64 / clip.aspect_ratio()).round() as u32);
            let fit = match scaled_height.cmp(&primary.height()) {
                std::cmp::Ordering::Equal => Fit::Exact,
                std::cmp::Ordering::Less => Fit::Pad,
                std::cmp::Ordering::Greater => Fit::Crop,
            };
            debug!(
                from = format!("{}x{}", clip.width, clip.height),
                to = format!("{scaled_width}x{scaled_height}"),
                ?fit,
                "outro resized to primary width"
            );
            OutroSegment {
                clip,
                scaled_width,
                scaled_height,
                fit,
            }
        });
        Self { primary, outro }
    }

    pub fn width(&self) -> u32 {
        self.primary.width()
    }

    pub fn height(&self) -> u32 {
        self.primary.height()
    }

    /// Primary duration plus the outro's.
    pub fn duration(&self) -> f64 {
        self.primary.duration() + self.outro.as_ref().map_or(0.0, |o| o.clip.duration)
    }

    /// Does the output carry an audio stream at all?
    pub fn has_audio(&self) -> bool {
        self.primary.audio.is_some() || self.outro.as_ref().is_some_and(|o| o.clip.has_audio())
    }
}

/// The finished file.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

/// Render the timeline to `spec.path`.
///
/// Nothing is written at `spec.path` unless the render succeeds; a failed
/// render leaves no partial file behind either.
pub fn export(timeline: &Timeline, spec: &OutputSpec, renderer: &dyn Renderer) -> Result<ExportSummary> {
    let target = &spec.path;
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let partial = partial_path(target);
    remove_if_present(&partial);

    let frame_rate = frame_rate(timeline, spec);
    let args = build_args(timeline, spec, frame_rate, &partial);
    info!(
        output = %target.display(),
        duration_secs = format!("{:.2}", timeline.duration()),
        outro = timeline.outro.is_some(),
        "rendering final video"
    );

    if let Err(e) = renderer.render(&args) {
        remove_if_present(&partial);
        return Err(e);
    }

    let written = std::fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        remove_if_present(&partial);
        return Err(Error::Export(format!(
            "renderer reported success but wrote nothing to {}",
            partial.display()
        )));
    }

    std::fs::rename(&partial, target).map_err(|e| {
        remove_if_present(&partial);
        Error::Export(format!("could not move render into {}: {e}", target.display()))
    })?;

    info!(path = %target.display(), size = written, "export complete");
    Ok(ExportSummary {
        path: target.clone(),
        duration: timeline.duration(),
        width: timeline.width(),
        height: timeline.height(),
        frame_rate,
    })
}

/// `dir/name.mp4` → `dir/name.partial.mp4`; the extension stays last so
/// ffmpeg still picks the container from it.
pub fn partial_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let name = match target.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    target.with_file_name(name)
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial render");
        }
    }
}

fn frame_rate(timeline: &Timeline, spec: &OutputSpec) -> f64 {
    spec.frame_rate
        .or(timeline.primary.base.frame_rate)
        .unwrap_or(FALLBACK_FRAME_RATE)
}

fn channel_layout(channels: u32) -> String {
    match channels {
        1 => "mono".into(),
        2 => "stereo".into(),
        6 => "5.1".into(),
        8 => "7.1".into(),
        n => format!("{n}c"),
    }
}

/// The complete ffmpeg argument list, output path last.
pub fn build_args(timeline: &Timeline, spec: &OutputSpec, frame_rate: f64, output: &Path) -> Vec<OsString> {
    let primary = &timeline.primary;
    let fps = filter::number(frame_rate);
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
        .iter()
        .map(OsString::from)
        .collect();

    // Inputs: 0 = source, then the logo looped over the primary duration, then the outro.
    args.push("-i".into());
    args.push(primary.base.path.clone().into_os_string());
    let mut next_input = 1;

    let logo = primary.logo().and_then(|overlay| match &overlay.content {
        OverlayContent::Image(path) => Some((overlay, path, next_input)),
        OverlayContent::Caption(_) => None,
    });
    if let Some((overlay, path, _)) = logo {
        for arg in ["-loop", "1", "-t"] {
            args.push(arg.into());
        }
        args.push(filter::seconds(overlay.end - overlay.start).into());
        args.push("-i".into());
        args.push(path.clone().into_os_string());
        next_input += 1;
    }

    let outro = timeline.outro.as_ref().map(|o| (o, next_input));
    if let Some((segment, _)) = outro {
        args.push("-i".into());
        args.push(segment.clip.path.clone().into_os_string());
    }

    let conform = [
        format!("fps={fps}"),
        format!("format={}", spec.pixel_format),
        "setsar=1".to_string(),
    ];
    let layout = channel_layout(spec.audio_channels);
    let audio_format = [
        format!("aresample={}", spec.audio_sample_rate),
        format!("aformat=sample_fmts=fltp:channel_layouts={layout}"),
    ];
    let silence = |duration: f64| {
        [
            format!("anullsrc=r={}:cl={layout}", spec.audio_sample_rate),
            format!("atrim=duration={}", filter::seconds(duration)),
        ]
    };

    let mut graph = FilterGraph::new();

    let mut caption_filters = Vec::new();
    for overlay in primary.captions() {
        if let OverlayContent::Caption(text) = &overlay.content {
            caption_filters.extend(filter::drawtext_filters(overlay, text, &primary.caption_style));
        }
    }

    match logo {
        Some((overlay, _, index)) => {
            graph.chain(&["0:v"], &caption_filters, &["captioned"], false);
            let logo_video = format!("{index}:v");
            graph.chain(
                &[&logo_video],
                &[
                    format!("scale={}:{}", overlay.width, overlay.height),
                    "format=rgba".to_string(),
                ],
                &["logo"],
                false,
            );
            let mut place = vec![format!("overlay={}:{}", overlay.x, overlay.y)];
            place.extend(conform.iter().cloned());
            graph.chain(&["captioned", "logo"], &place, &["v0"], false);
        }
        None => {
            let mut filters = caption_filters;
            filters.extend(conform.iter().cloned());
            graph.chain(&["0:v"], &filters, &["v0"], false);
        }
    }

    let (video_map, audio_map) = match outro {
        Some((segment, index)) => {
            let (width, height) = (timeline.width(), timeline.height());
            let mut outro_filters = vec![format!("scale={}:{}", segment.scaled_width, segment.scaled_height)];
            match segment.fit {
                Fit::Exact => {}
                Fit::Pad => outro_filters.push(format!("pad={width}:{height}:0:(oh-ih)/2:black")),
                Fit::Crop => outro_filters.push(format!("crop={width}:{height}:0:(ih-oh)/2")),
            }
            outro_filters.extend(conform.iter().cloned());
            let outro_video = format!("{index}:v");
            graph.chain(&[&outro_video], &outro_filters, &["v1"], false);

            // Each segment keeps its own audio; only the sample format is unified for concat.
            match &primary.audio {
                Some(track) => {
                    let label = format!("0:a:{}", track.stream_index);
                    graph.chain(&[&label], &audio_format, &["a0"], true);
                }
                None => {
                    graph.chain(&[], &silence(primary.duration()), &["a0"], true);
                }
            }
            if segment.clip.has_audio() {
                let label = format!("{index}:a:0");
                graph.chain(&[&label], &audio_format, &["a1"], true);
            } else {
                graph.chain(&[], &silence(segment.clip.duration), &["a1"], true);
            }

            graph.chain(
                &["v0", "a0", "v1", "a1"],
                &["concat=n=2:v=1:a=1".to_string()],
                &["vout", "aout"],
                false,
            );
            ("[vout]".to_string(), Some("[aout]".to_string()))
        }
        None => (
            "[v0]".to_string(),
            primary
                .audio
                .as_ref()
                .map(|track| format!("0:a:{}", track.stream_index)),
        ),
    };

    args.push("-filter_complex".into());
    args.push(graph.render().into());
    args.push("-map".into());
    args.push(video_map.into());

    let mut codec_args = vec![
        "-c:v".to_string(),
        spec.video_codec.clone(),
        "-preset".to_string(),
        spec.preset.clone(),
        "-pix_fmt".to_string(),
        spec.pixel_format.clone(),
        "-r".to_string(),
        fps,
    ];
    if let Some(audio) = audio_map {
        args.push("-map".into());
        args.push(audio.into());
        codec_args.extend([
            "-c:a".to_string(),
            spec.audio_codec.clone(),
            "-ac".to_string(),
            spec.audio_channels.to_string(),
            "-ar".to_string(),
            spec.audio_sample_rate.to_string(),
            "-b:a".to_string(),
            spec.audio_bitrate.clone(),
        ]);
    }
    args.extend(codec_args.into_iter().map(OsString::from));
    args.push("-movflags".into());
    args.push("+faststart".into());
    args.push(output.as_os_str().to_os_string());
    args
}
