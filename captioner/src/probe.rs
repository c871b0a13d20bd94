//! Source loading: turn a file path into a [`MediaClip`].
//!
//! [`FfprobeProber`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams` and maps
//! the first video stream and first audio stream onto the clip.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tools::{stderr_excerpt, ToolCommand};
use crate::types::{AudioTrack, MediaClip};

/// Opens media files for the pipeline.
pub trait Prober {
    fn probe(&self, path: &Path) -> Result<MediaClip>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaClip> {
        if !path.exists() {
            return Err(Error::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = ToolCommand::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .run()?;

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "{}: ffprobe failed: {}",
                path.display(),
                stderr_excerpt(&output)
            )));
        }

        let clip = parse_ffprobe_json(path, &output.stdout)?;
        info!(
            path = %path.display(),
            width = clip.width,
            height = clip.height,
            duration_secs = format!("{:.2}", clip.duration),
            audio = clip.has_audio(),
            "source loaded"
        );
        Ok(clip)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
}

/// Map ffprobe's JSON onto a clip.
pub(crate) fn parse_ffprobe_json(path: &Path, json: &[u8]) -> Result<MediaClip> {
    let parsed: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::Probe(format!("{}: unreadable ffprobe output: {e}", path.display())))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::Probe(format!("{}: no video stream", path.display())))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::Probe(format!(
                "{}: video stream has no dimensions",
                path.display()
            )))
        }
    };

    let duration = parsed
        .format
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| video.duration.as_deref().and_then(parse_seconds))
        .ok_or_else(|| Error::Probe(format!("{}: unknown duration", path.display())))?;

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate));

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| {
            Arc::new(AudioTrack {
                stream_index: 0,
                codec: s.codec_name.clone(),
                channels: s.channels,
                sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            })
        });

    debug!(?frame_rate, codec = ?video.codec_name, "parsed ffprobe output");

    Ok(MediaClip {
        path: path.to_path_buf(),
        width,
        height,
        duration,
        frame_rate,
        audio,
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0)
}

/// "30000/1001" → 29.97; "0/0" → None.
fn parse_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}
