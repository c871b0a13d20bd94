//! ffmpeg filtergraph text.
//!
//! Values pass two parsers inside `-filter_complex`: the filter option parser
//! (`\`, `'` and `:` are special) and then the graph parser (`\`, `'`, `[`,
//! `]`, `,` and `;`). [`escape_value`] applies both levels so any caption
//! text or path survives intact.

use std::fmt::Write as _;

use crate::caption::CaptionText;
use crate::compose::Overlay;
use crate::config::CaptionStyle;

/// Escape an option value for use inside a filtergraph.
pub fn escape_value(raw: &str) -> String {
    let mut option_level = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

/// Seconds with millisecond precision, as filter expressions expect them.
pub fn seconds(t: f64) -> String {
    format!("{t:.3}")
}

/// Shortest decimal form: 30 → "30", 29.97 → "29.97".
pub fn number(v: f64) -> String {
    let s = format!("{v:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `enable` expression for a half-open interval `[start, end)`.
pub fn enable_between(start: f64, end: f64) -> String {
    escape_value(&format!("gte(t,{})*lt(t,{})", seconds(start), seconds(end)))
}

/// One `drawtext` filter per caption line, each line centred on its own.
pub fn drawtext_filters(overlay: &Overlay, caption: &CaptionText, style: &CaptionStyle) -> Vec<String> {
    let enable = enable_between(overlay.start, overlay.end);
    caption
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let y = overlay.y + caption.line_height * i as u32;
            let mut f = String::from("drawtext=");
            if let Some(font) = &style.font_file {
                let _ = write!(f, "fontfile={}:", escape_value(&font.to_string_lossy()));
            }
            let _ = write!(
                f,
                "text={}:expansion=none:fontsize={}:fontcolor={}:bordercolor={}:borderw={}",
                escape_value(line),
                caption.font_size,
                escape_value(&style.font_color),
                escape_value(&style.stroke_color),
                style.stroke_width,
            );
            if let Some(opacity) = style.box_opacity {
                let pad = ((caption.font_size as f64) * 0.2).round() as u32;
                let _ = write!(f, ":box=1:boxcolor=black@{opacity:.2}:boxborderw={pad}");
            }
            let _ = write!(f, ":x=(w-text_w)/2:y={y}:enable={enable}");
            f
        })
        .collect()
}

/// A `-filter_complex` program assembled chain by chain.
#[derive(Debug, Default, Clone)]
pub struct FilterGraph {
    chains: Vec<String>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[in...]f1,f2,...[out...]`. An empty filter list becomes `null` / `anull`.
    pub fn chain(&mut self, inputs: &[&str], filters: &[String], outputs: &[&str], audio: bool) -> &mut Self {
        let mut chain = String::new();
        for input in inputs {
            let _ = write!(chain, "[{input}]");
        }
        if filters.is_empty() {
            chain.push_str(if audio { "anull" } else { "null" });
        } else {
            chain.push_str(&filters.join(","));
        }
        for output in outputs {
            let _ = write!(chain, "[{output}]");
        }
        self.chains.push(chain);
        self
    }

    pub fn render(&self) -> String {
        self.chains.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::OverlayContent;

    #[test]
    fn test_escape_matches_ffmpeg_documentation_example() {
        let raw = "this is a 'string': may contain one, or more, special characters";
        let expected = r"this is a \\\'string\\\'\\: may contain one\, or more\, special characters";
        assert_eq!(escape_value(raw), expected);
    }

    #[test]
    fn test_escape_brackets_and_backslash() {
        assert_eq!(escape_value("[a];b"), r"\[a\]\;b");
        assert_eq!(escape_value(r"C:\x"), r"C\\:\\\\x");
        assert_eq!(escape_value("plain words"), "plain words");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number(30.0), "30");
        assert_eq!(number(29.97), "29.97");
        assert_eq!(number(23.976_023_976), "23.976");
        assert_eq!(seconds(2.0), "2.000");
    }

    #[test]
    fn test_enable_is_half_open() {
        assert_eq!(enable_between(0.0, 2.0), r"gte(t\,0.000)*lt(t\,2.000)");
    }

    fn caption_overlay() -> (Overlay, CaptionText) {
        let text = CaptionText {
            lines: vec!["hello, world".into(), "100% sure".into()],
            font_size: 36,
            line_height: 43,
        };
        let overlay = Overlay {
            content: OverlayContent::Caption(text.clone()),
            start: 1.0,
            end: 2.5,
            x: 64,
            y: 612,
            width: 1152,
            height: 79,
        };
        (overlay, text)
    }

    #[test]
    fn test_drawtext_one_filter_per_line() {
        let (overlay, text) = caption_overlay();
        let filters = drawtext_filters(&overlay, &text, &CaptionStyle::default());
        assert_eq!(filters.len(), 2);
        assert!(filters[0].starts_with(r"drawtext=text=hello\, world:expansion=none:fontsize=36"));
        assert!(filters[0].contains(":y=612:"));
        assert!(filters[1].contains("text=100% sure"));
        assert!(filters[1].contains(":y=655:"));
        assert!(filters[1].ends_with(r"enable=gte(t\,1.000)*lt(t\,2.500)"));
        assert!(!filters[0].contains("box=1"));
    }

    #[test]
    fn test_drawtext_box_and_font() {
        let (overlay, text) = caption_overlay();
        let style = CaptionStyle::default()
            .box_opacity(Some(0.5))
            .unwrap()
            .font_file("/fonts/Arial Bold.ttf".into());
        let filters = drawtext_filters(&overlay, &text, &style);
        assert!(filters[0].starts_with("drawtext=fontfile=/fonts/Arial Bold.ttf:text="));
        assert!(filters[0].contains(":box=1:boxcolor=black@0.50:boxborderw=7"));
    }

    #[test]
    fn test_filter_graph_render() {
        let mut graph = FilterGraph::new();
        graph
            .chain(&["0:v"], &[], &["v0"], false)
            .chain(&["1:v"], &["scale=260:130".into(), "format=rgba".into()], &["logo"], false)
            .chain(&["0:a:0"], &[], &["a0"], true)
            .chain(&["v0", "a0"], &["concat=n=1:v=1:a=1".into()], &["vout", "aout"], false);
        assert_eq!(
            graph.render(),
            "[0:v]null[v0];[1:v]scale=260:130,format=rgba[logo];[0:a:0]anull[a0];[v0][a0]concat=n=1:v=1:a=1[vout][aout]"
        );
    }
}
