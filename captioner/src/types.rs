use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single word with timing and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub probability: f32,
}

/// A timed unit of transcribed text. Times are seconds from the clip start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub no_speech_probability: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            no_speech_probability: 0.0,
            words: None,
        }
    }
}

/// Complete transcription result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub language: String,
    pub duration: f64,
    pub model: String,
}

impl Transcript {
    /// Full text (all segments concatenated).
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Segments with visible text, in order.
    fn cues(&self) -> impl Iterator<Item = (&Segment, &str)> {
        self.segments
            .iter()
            .map(|s| (s, s.text.trim()))
            .filter(|(_, text)| !text.is_empty())
    }

    /// Format as SRT subtitles. Blank segments get no cue; numbering stays contiguous.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, (seg, text)) in self.cues().enumerate() {
            out.push_str(&format!("{}\n", i + 1));
            out.push_str(&format!(
                "{} --> {}\n",
                format_timestamp(seg.start, ','),
                format_timestamp(seg.end, ',')
            ));
            out.push_str(text);
            out.push_str("\n\n");
        }
        out
    }

    /// Format as WebVTT subtitles.
    pub fn to_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for (seg, text) in self.cues() {
            out.push_str(&format!(
                "{} --> {}\n",
                format_timestamp(seg.start, '.'),
                format_timestamp(seg.end, '.')
            ));
            out.push_str(text);
            out.push_str("\n\n");
        }
        out
    }

    /// Format as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// HH:MM:SS{sep}mmm: `,` for SRT, `.` for WebVTT.
fn format_timestamp(seconds: f64, sep: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{h:02}:{m:02}:{s:02}{sep}{ms:03}")
}

/// The audio stream of a source file.
///
/// Only the base clip owns one; compositions and timelines hold the same
/// `Arc` so the mapping back to the source stream is never lost.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    /// Index among the file's audio streams (`0:a:N` in ffmpeg terms).
    pub stream_index: usize,
    pub codec: Option<String>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
}

/// A probed video file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaClip {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Seconds.
    pub duration: f64,
    pub frame_rate: Option<f64>,
    pub audio: Option<Arc<AudioTrack>>,
}

impl MediaClip {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// A non-fatal condition reported alongside a successful render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    MissingLogo,
    MissingOutro,
    SilentSource,
    CaptionSkipped { index: usize, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingLogo => write!(f, "no logo found"),
            Warning::MissingOutro => write!(f, "no outro found"),
            Warning::SilentSource => write!(f, "source video has no audio track"),
            Warning::CaptionSkipped { index, reason } => {
                write!(f, "caption {index} skipped: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        Transcript {
            segments: vec![
                Segment::new(0.0, 2.5, " Hello there. "),
                Segment::new(2.5, 3.0, "  "),
                Segment::new(3.0, 3661.25, "General Kenobi."),
            ],
            language: "en".into(),
            duration: 3662.0,
            model: "tiny".into(),
        }
    }

    #[test]
    fn test_text_skips_blank_segments() {
        assert_eq!(transcript().text(), "Hello there. General Kenobi.");
    }

    #[test]
    fn test_srt_timestamps() {
        let srt = transcript().to_srt();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:02,500\nHello there.\n\n"));
        assert!(srt.contains("2\n00:00:03,000 --> 01:01:01,250\nGeneral Kenobi."));
    }

    #[test]
    fn test_blank_segments_get_no_cue() {
        let srt = transcript().to_srt();
        assert_eq!(srt.matches(" --> ").count(), 2);
        assert!(!srt.contains("00:00:02,500 --> 00:00:03,000"));
        assert!(!srt.contains("\n\n\n"));
        assert!(!srt.contains("3\n"));

        let vtt = transcript().to_vtt();
        assert_eq!(vtt.matches(" --> ").count(), 2);
        assert!(!vtt.contains("00:00:02.500 --> 00:00:03.000"));
    }

    #[test]
    fn test_vtt_header_and_separator() {
        let vtt = transcript().to_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:02.500"));
    }

    #[test]
    fn test_json_roundtrip_keeps_segments() {
        let json = transcript().to_json_pretty().unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back.segments.len(), 3);
        assert_eq!(back.segments[0].text, " Hello there. ");
    }

    #[test]
    fn test_warning_messages() {
        assert_eq!(Warning::MissingOutro.to_string(), "no outro found");
        assert_eq!(Warning::MissingLogo.to_string(), "no logo found");
        let skipped = Warning::CaptionSkipped {
            index: 4,
            reason: "inverted interval".into(),
        };
        assert_eq!(skipped.to_string(), "caption 4 skipped: inverted interval");
    }
}
