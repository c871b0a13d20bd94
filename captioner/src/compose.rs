//! Layer stacking: base clip, caption overlays and an optional logo.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::caption::CaptionText;
use crate::config::{CaptionStyle, Corner, LogoStyle};
use crate::error::{Error, Result};
use crate::types::{AudioTrack, MediaClip};

/// What an overlay draws.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    Caption(CaptionText),
    Image(PathBuf),
}

/// A timed visual layer above the base clip. Overlays never carry audio.
///
/// Coordinates are base-clip pixels, origin top-left; the layer is visible
/// for `start <= t < end`.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub content: OverlayContent,
    pub start: f64,
    pub end: f64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Overlay {
    pub fn is_caption(&self) -> bool {
        matches!(self.content, OverlayContent::Caption(_))
    }
}

/// A logo file with its native pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl LogoImage {
    /// Read the image header for its dimensions.
    pub fn open(path: &Path) -> Result<Self> {
        let (width, height) = image::image_dimensions(path)
            .map_err(|e| Error::LogoRender(format!("{}: {e}", path.display())))?;
        if width == 0 || height == 0 {
            return Err(Error::LogoRender(format!("{}: empty image", path.display())));
        }
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
        })
    }
}

/// Base clip plus overlays on one timeline and one coordinate space.
#[derive(Debug, Clone)]
pub struct Composition {
    pub base: MediaClip,
    /// Bottom to top: captions by start time, then the logo.
    pub layers: Vec<Overlay>,
    /// Always the base clip's own track.
    pub audio: Option<Arc<AudioTrack>>,
    pub caption_style: CaptionStyle,
}

impl Composition {
    pub fn width(&self) -> u32 {
        self.base.width
    }

    pub fn height(&self) -> u32 {
        self.base.height
    }

    /// End of the longest layer.
    pub fn duration(&self) -> f64 {
        self.layers
            .iter()
            .map(|l| l.end)
            .fold(self.base.duration, f64::max)
    }

    pub fn captions(&self) -> impl Iterator<Item = &Overlay> {
        self.layers.iter().filter(|l| l.is_caption())
    }

    pub fn logo(&self) -> Option<&Overlay> {
        self.layers.iter().find(|l| !l.is_caption())
    }
}

/// Stack `captions` and `logo` over `base`.
///
/// The flattened result gets the base clip's audio track reassigned
/// explicitly; overlays contribute none.
pub fn compose(
    base: &MediaClip,
    mut captions: Vec<Overlay>,
    logo: Option<&LogoImage>,
    caption_style: &CaptionStyle,
    logo_style: &LogoStyle,
) -> Composition {
    captions.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut layers = captions;

    if let Some(logo) = logo {
        let overlay = place_logo(base, logo, logo_style);
        debug!(
            path = %logo.path.display(),
            width = overlay.width,
            height = overlay.height,
            x = overlay.x,
            y = overlay.y,
            "logo placed"
        );
        layers.push(overlay);
    }

    let composition = Composition {
        base: base.clone(),
        layers,
        audio: base.audio.clone(),
        caption_style: caption_style.clone(),
    };

    info!(
        layers = composition.layers.len(),
        audio = composition.audio.is_some(),
        duration_secs = format!("{:.2}", composition.duration()),
        "composition built"
    );
    composition
}

fn place_logo(base: &MediaClip, logo: &LogoImage, style: &LogoStyle) -> Overlay {
    let height = even((base.height as f64 * style.height_fraction).round() as u32);
    let width = even((logo.width as f64 * height as f64 / logo.height as f64).round() as u32);
    let margin = style.margin;

    let left = margin;
    let right = base.width.saturating_sub(width + margin);
    let top = margin;
    let bottom = base.height.saturating_sub(height + margin);

    let (x, y) = match style.corner {
        Corner::TopLeft => (left, top),
        Corner::TopRight => (right, top),
        Corner::BottomLeft => (left, bottom),
        Corner::BottomRight => (right, bottom),
    };

    Overlay {
        content: OverlayContent::Image(logo.path.clone()),
        start: 0.0,
        end: base.duration,
        x,
        y,
        width,
        height,
    }
}

/// Round down to an even size, never below 2.
pub(crate) fn even(px: u32) -> u32 {
    (px & !1).max(2)
}
