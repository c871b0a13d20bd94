//! Caption layout: timed transcript segments in, positioned text overlays out.

use tracing::{debug, warn};

use crate::compose::{Overlay, OverlayContent};
use crate::config::{CaptionFailurePolicy, CaptionStyle};
use crate::error::{Error, Result};
use crate::types::{MediaClip, Segment, Warning};

/// Each auto-fit step shrinks the font to this fraction of its previous size.
const AUTO_FIT_STEP: f64 = 0.9;

/// Caption overlays for one clip, ordered by start time.
#[derive(Debug, Clone, Default)]
pub struct CaptionSet {
    pub overlays: Vec<Overlay>,
    pub warnings: Vec<Warning>,
}

/// A wrapped caption block.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionText {
    pub lines: Vec<String>,
    pub font_size: u32,
    /// Distance between consecutive baselines, in pixels.
    pub line_height: u32,
}

struct Timed<'a> {
    index: usize,
    start: f64,
    end: f64,
    text: &'a str,
}

/// Turn transcript segments into caption overlays for `clip`.
///
/// Blank segments are dropped. A segment whose timing cannot be shown on the
/// clip is handled according to `policy`.
pub fn build_captions(
    segments: &[Segment],
    clip: &MediaClip,
    style: &CaptionStyle,
    policy: CaptionFailurePolicy,
) -> Result<CaptionSet> {
    let mut set = CaptionSet::default();
    let mut timed = Vec::with_capacity(segments.len());

    for (index, segment) in segments.iter().enumerate() {
        let text = segment.text.trim();
        if text.is_empty() {
            debug!(index, "skipping blank segment");
            continue;
        }

        match check_interval(segment, clip.duration) {
            Ok(Some((start, end))) => timed.push(Timed {
                index,
                start,
                end,
                text,
            }),
            Ok(None) => debug!(index, "skipping zero-length segment"),
            Err(reason) => match policy {
                CaptionFailurePolicy::Abort => {
                    return Err(Error::CaptionRender(format!("segment {index}: {reason}")));
                }
                CaptionFailurePolicy::Skip => {
                    warn!(index, %reason, "dropping caption");
                    set.warnings.push(Warning::CaptionSkipped { index, reason });
                }
            },
        }
    }

    timed.sort_by(|a, b| a.start.total_cmp(&b.start));

    // One caption on screen at a time: a caption ends where the next begins.
    for i in 1..timed.len() {
        let next_start = timed[i].start;
        let prev = &mut timed[i - 1];
        if prev.end > next_start {
            debug!(index = prev.index, from = prev.end, to = next_start, "truncating overlapping caption");
            prev.end = next_start;
        }
    }

    for t in timed.into_iter().filter(|t| t.end > t.start) {
        set.overlays.push(layout_caption(t.text, t.start, t.end, clip, style));
    }

    debug!(captions = set.overlays.len(), skipped = set.warnings.len(), "captions built");
    Ok(set)
}

/// Validate a segment against the clip. `Ok(None)` means there is nothing to show.
fn check_interval(segment: &Segment, clip_duration: f64) -> std::result::Result<Option<(f64, f64)>, String> {
    let (start, end) = (segment.start, segment.end);
    if !start.is_finite() || !end.is_finite() {
        return Err(format!("non-finite timestamps ({start}, {end})"));
    }
    if end < start {
        return Err(format!("ends before it starts ({start:.2}s > {end:.2}s)"));
    }
    let start = start.max(0.0);
    if start >= clip_duration {
        return Err(format!(
            "starts at {start:.2}s, after the clip ends at {clip_duration:.2}s"
        ));
    }
    let end = end.min(clip_duration);
    if end <= start {
        return Ok(None);
    }
    Ok(Some((start, end)))
}

fn layout_caption(text: &str, start: f64, end: f64, clip: &MediaClip, style: &CaptionStyle) -> Overlay {
    let box_width = ((clip.width as f64 * style.width_fraction).round() as u32).max(1);
    let min_font = font_px(clip.height, style.min_font_fraction.min(style.font_fraction));
    let mut font_size = font_px(clip.height, style.font_fraction);

    let mut lines = wrap_text(text, chars_per_line(box_width, font_size, style.glyph_width_ratio));
    while lines.len() > style.max_lines && font_size > min_font {
        font_size = ((font_size as f64 * AUTO_FIT_STEP).floor() as u32).max(min_font);
        lines = wrap_text(text, chars_per_line(box_width, font_size, style.glyph_width_ratio));
    }

    let line_height = ((font_size as f64 * style.line_spacing).round() as u32).max(font_size);
    let block_height = line_height * (lines.len() as u32 - 1) + font_size;

    let anchor = (clip.height as f64 * style.y_fraction).round() as u32;
    let y = anchor.min(clip.height.saturating_sub(block_height + style.stroke_width));

    Overlay {
        content: OverlayContent::Caption(CaptionText {
            lines,
            font_size,
            line_height,
        }),
        start,
        end,
        x: (clip.width.saturating_sub(box_width)) / 2,
        y,
        width: box_width,
        height: block_height,
    }
}

fn font_px(clip_height: u32, fraction: f64) -> u32 {
    ((clip_height as f64 * fraction).round() as u32).max(1)
}

fn chars_per_line(box_width: u32, font_size: u32, glyph_width_ratio: f64) -> usize {
    let advance = (font_size as f64 * glyph_width_ratio).max(1.0);
    ((box_width as f64 / advance).floor() as usize).max(1)
}

/// Greedy word wrap. Whitespace runs collapse; words longer than a line are split.
pub(crate) fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            let piece_len = piece.len();
            let needed = if current_len == 0 { piece_len } else { current_len + 1 + piece_len };
            if needed > max_chars && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece);
            current_len += piece_len;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(width: u32, height: u32, duration: f64) -> MediaClip {
        MediaClip {
            path: "in.mp4".into(),
            width,
            height,
            duration,
            frame_rate: Some(30.0),
            audio: None,
        }
    }

    fn text_of(overlay: &Overlay) -> &CaptionText {
        match &overlay.content {
            OverlayContent::Caption(text) => text,
            other => panic!("expected caption, got {other:?}"),
        }
    }

    #[test]
    fn test_one_overlay_per_nonempty_segment_with_exact_intervals() {
        let segments = vec![
            Segment::new(0.0, 1.5, " first "),
            Segment::new(1.5, 2.0, "   "),
            Segment::new(2.0, 3.25, "second"),
            Segment::new(4.0, 6.0, "third"),
        ];
        let set = build_captions(&segments, &clip(1280, 720, 10.0), &CaptionStyle::default(), CaptionFailurePolicy::Abort).unwrap();

        let intervals: Vec<_> = set.overlays.iter().map(|o| (o.start, o.end)).collect();
        assert_eq!(intervals, [(0.0, 1.5), (2.0, 3.25), (4.0, 6.0)]);
        assert_eq!(text_of(&set.overlays[0]).lines, ["first"]);
        assert!(set.warnings.is_empty());
    }

    #[test]
    fn test_layout_scales_with_resolution() {
        let segments = vec![Segment::new(0.0, 2.0, "hello")];
        let style = CaptionStyle::default();
        let small = build_captions(&segments, &clip(640, 360, 5.0), &style, CaptionFailurePolicy::Abort).unwrap();
        let large = build_captions(&segments, &clip(1920, 1080, 5.0), &style, CaptionFailurePolicy::Abort).unwrap();

        assert_eq!(text_of(&small.overlays[0]).font_size, 18);
        assert_eq!(text_of(&large.overlays[0]).font_size, 54);
        assert_eq!(small.overlays[0].y, 306);
        assert_eq!(large.overlays[0].y, 918);
        assert_eq!(large.overlays[0].width, 1728);
        assert_eq!(large.overlays[0].x, 96);
    }

    #[test]
    fn test_overlapping_segments_are_truncated() {
        let segments = vec![
            Segment::new(0.0, 3.0, "one"),
            Segment::new(2.0, 4.0, "two"),
        ];
        let set = build_captions(&segments, &clip(1280, 720, 10.0), &CaptionStyle::default(), CaptionFailurePolicy::Abort).unwrap();
        assert_eq!(set.overlays[0].end, 2.0);
        assert_eq!(set.overlays[1].start, 2.0);
    }

    #[test]
    fn test_out_of_order_segments_are_sorted() {
        let segments = vec![
            Segment::new(5.0, 6.0, "later"),
            Segment::new(1.0, 2.0, "earlier"),
        ];
        let set = build_captions(&segments, &clip(1280, 720, 10.0), &CaptionStyle::default(), CaptionFailurePolicy::Abort).unwrap();
        assert_eq!(text_of(&set.overlays[0]).lines, ["earlier"]);
        assert_eq!(text_of(&set.overlays[1]).lines, ["later"]);
    }

    #[test]
    fn test_end_is_clamped_to_clip_duration() {
        let segments = vec![Segment::new(9.0, 10.4, "tail")];
        let set = build_captions(&segments, &clip(1280, 720, 10.0), &CaptionStyle::default(), CaptionFailurePolicy::Abort).unwrap();
        assert_eq!(set.overlays[0].end, 10.0);
    }

    #[test]
    fn test_bad_segment_aborts_by_default() {
        let segments = vec![
            Segment::new(0.0, 1.0, "fine"),
            Segment::new(3.0, 2.0, "inverted"),
        ];
        let err = build_captions(&segments, &clip(1280, 720, 10.0), &CaptionStyle::default(), CaptionFailurePolicy::Abort).unwrap_err();
        assert!(matches!(err, Error::CaptionRender(_)));
        assert!(err.to_string().contains("segment 1"));
    }

    #[test]
    fn test_bad_segment_skipped_with_warning() {
        let segments = vec![
            Segment::new(0.0, 1.0, "fine"),
            Segment::new(12.0, 13.0, "past the end"),
            Segment::new(f64::NAN, 2.0, "broken"),
        ];
        let set = build_captions(&segments, &clip(1280, 720, 10.0), &CaptionStyle::default(), CaptionFailurePolicy::Skip).unwrap();
        assert_eq!(set.overlays.len(), 1);
        assert_eq!(set.warnings.len(), 2);
        assert!(matches!(set.warnings[0], Warning::CaptionSkipped { index: 1, .. }));
        assert!(matches!(set.warnings[1], Warning::CaptionSkipped { index: 2, .. }));
    }

    #[test]
    fn test_long_text_wraps_and_shrinks() {
        let text = "this caption is far too long to fit on a single line of a narrow vertical video and keeps going for a while longer still";
        let segments = vec![Segment::new(0.0, 4.0, text)];
        let style = CaptionStyle::default();
        let set = build_captions(&segments, &clip(360, 640, 5.0), &style, CaptionFailurePolicy::Abort).unwrap();
        let caption = text_of(&set.overlays[0]);

        assert!(caption.lines.len() > 1);
        assert!(caption.font_size < 32, "auto-fit should shrink the 32px font");
        assert!(caption.font_size >= 19, "never below the minimum fraction");
        assert_eq!(caption.lines.join(" "), text);
    }

    #[test]
    fn test_block_is_kept_inside_frame() {
        let style = CaptionStyle::default().y_fraction(0.98).unwrap();
        let segments = vec![Segment::new(0.0, 1.0, "bottom")];
        let set = build_captions(&segments, &clip(1280, 720, 5.0), &style, CaptionFailurePolicy::Abort).unwrap();
        let overlay = &set.overlays[0];
        assert!(overlay.y + overlay.height <= 720);
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("a bb ccc dddd", 6), ["a bb", "ccc", "dddd"]);
        assert_eq!(wrap_text("abcdefgh", 3), ["abc", "def", "gh"]);
        assert_eq!(wrap_text("  spaced\n\tout  ", 20), ["spaced out"]);
        assert!(wrap_text("", 10).is_empty());
        assert_eq!(wrap_text("ñandú café", 5), ["ñandú", "café"]);
    }
}
