//! Result compositing
//!
//! Draws detections onto a rotated copy of a frame: a 2px box in a colour
//! derived from the label, then `label score` in white on a black tag at the
//! box's top-left corner. Used for screenshots.

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::detection::Detection;
use crate::utils::affine_transform::{rotation_expanding, warp_rgba};

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/font/DejaVuSans.ttf");

static DEFAULT_FONT: Lazy<FontArc> = Lazy::new(|| {
    FontArc::try_from_slice(BUNDLED_FONT).expect("bundled DejaVuSans.ttf is a valid font")
});

pub const TEXT_SIZE: f32 = 20.0;
pub const BOX_STROKE: u32 = 2;
pub const TAG_MARGIN: u32 = 2;

const TAG_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const TAG_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font data in {0}")]
    Font(String),
}

/// Hash of a label string: `h = 31 * h + unit` over UTF-16 code units with
/// wrapping i32 arithmetic. Stable across runs and platforms.
pub fn label_hash(label: &str) -> i32 {
    label
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Display colour for a label: the hash's three low bytes as r, g, b.
pub fn color_of(label: &str) -> Rgba<u8> {
    let h = label_hash(label);
    Rgba([
        ((h >> 16) & 0xFF) as u8,
        ((h >> 8) & 0xFF) as u8,
        (h & 0xFF) as u8,
        255,
    ])
}

/// Rotate `source` by `degrees` (clockwise, no scaling) into a new raster.
/// Quarter turns are exact; other angles enlarge the canvas to fit.
pub fn rotate(source: &RgbaImage, degrees: f32) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    let quarter = (normalized / 90.0).round();
    if (normalized - quarter * 90.0).abs() < 1e-3 {
        return match quarter as i32 % 4 {
            1 => imageops::rotate90(source),
            2 => imageops::rotate180(source),
            3 => imageops::rotate270(source),
            _ => source.clone(),
        };
    }

    let (matrix, size) = rotation_expanding(source.width(), source.height(), normalized);
    warp_rgba(source, &matrix, size).unwrap_or_else(|| source.clone())
}

#[derive(Clone)]
pub struct ResultRenderer {
    font: FontArc,
    scale: PxScale,
}

impl Default for ResultRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultRenderer {
    /// Renderer using the bundled DejaVu Sans.
    pub fn new() -> Self {
        Self {
            font: DEFAULT_FONT.clone(),
            scale: PxScale::from(TEXT_SIZE),
        }
    }

    pub fn from_font_file(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path).map_err(|source| RenderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| RenderError::Font(path.display().to_string()))?;
        Ok(Self {
            font,
            scale: PxScale::from(TEXT_SIZE),
        })
    }

    pub fn with_text_size(mut self, px: f32) -> Self {
        self.scale = PxScale::from(px.max(1.0));
        self
    }

    /// Width and height of the tag text for `detection`.
    pub fn text_bounds(&self, detection: &Detection) -> (u32, u32) {
        text_size(self.scale, &self.font, &detection.display_text())
    }

    /// Composite `results` onto a rotated copy of `source`. Later results
    /// draw over earlier ones. `source` is left untouched.
    pub fn render(&self, source: &RgbaImage, results: &[Detection], rotation_degrees: f32) -> RgbaImage {
        let mut canvas = rotate(source, rotation_degrees);
        for detection in results {
            self.draw_detection(&mut canvas, detection);
        }
        canvas
    }

    /// Box edges sit on pixel boundaries and the stroke straddles them: one
    /// pixel outside the box, one inside. The tag text has its baseline at
    /// `top + text_height`, so only descenders reach below the tag.
    fn draw_detection(&self, canvas: &mut RgbaImage, detection: &Detection) {
        let color = color_of(detection.label());
        let bbox = detection.bbox();
        // keep far-off boxes inside i32 range
        let max_x = canvas.width() as f32 + BOX_STROKE as f32;
        let max_y = canvas.height() as f32 + BOX_STROKE as f32;
        let min = -(BOX_STROKE as f32);
        let left = bbox.left.round().clamp(min, max_x) as i32;
        let top = bbox.top.round().clamp(min, max_y) as i32;
        let right = bbox.right.round().clamp(min, max_x) as i32;
        let bottom = bbox.bottom.round().clamp(min, max_y) as i32;

        let width = (right - left).max(0) as u32;
        let height = (bottom - top).max(0) as u32;
        let half = (BOX_STROKE / 2) as i32;
        for i in 0..BOX_STROKE {
            let (w, h) = match (
                (width + BOX_STROKE).checked_sub(2 * i),
                (height + BOX_STROKE).checked_sub(2 * i),
            ) {
                (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
                _ => break,
            };
            let rect = Rect::at(left - half + i as i32, top - half + i as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let text = detection.display_text();
        let (text_width, text_height) = text_size(self.scale, &self.font, &text);
        draw_filled_rect_mut(
            canvas,
            Rect::at(left, top).of_size(text_width + TAG_MARGIN, text_height + TAG_MARGIN),
            TAG_BACKGROUND,
        );
        // imageproc puts the baseline at y + ascent
        let ascent = self.font.as_scaled(self.scale).ascent().round() as i32;
        let baseline = top + text_height as i32;
        draw_text_mut(
            canvas,
            TAG_TEXT,
            left,
            baseline - ascent,
            self.scale,
            &self.font,
            &text,
        );
    }
}
