//! Auto-generated signatures: the applicant's name set in a cursive face.
//!
//! The same font and name always produce the same PNG, so re-rendering after
//! a back-navigation cannot change what the applicant saw on the preview.

use super::{encode_png, SignatureImage};
use crate::error::FormError;
use crate::script::visual_order;
use image::{Rgba, RgbaImage};
use rusttype::{point, Font, PositionedGlyph, Scale};
use tracing::debug;

/// Canvas width in pixels.
pub const CANVAS_WIDTH: u32 = 300;
/// Canvas height in pixels.
pub const CANVAS_HEIGHT: u32 = 100;

const PADDING: f32 = 10.0;
const START_SIZE_PX: f32 = 56.0;
const MIN_SIZE_PX: f32 = 14.0;
const SIZE_STEP_PX: f32 = 2.0;
const INK: [u8; 3] = [20, 20, 60];

/// Renders `"first last"` onto a fixed-size transparent canvas.
pub struct SignatureRenderer {
    font: Font<'static>,
    name: String,
}

impl SignatureRenderer {
    /// Load the cursive font used for auto-generated signatures.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, FormError> {
        let name = name.into();
        let font = Font::try_from_vec(data).ok_or_else(|| FormError::FontLoadFailed {
            name: name.clone(),
            detail: "not a TrueType/OpenType font".into(),
        })?;
        Ok(Self { font, name })
    }

    pub fn font_name(&self) -> &str {
        &self.name
    }

    /// Render a signature for the given name parts.
    ///
    /// The font size starts large and shrinks until the name fits inside the
    /// padded canvas width; the text is centred both ways.
    pub fn render(&self, first_name: &str, last_name: &str) -> Result<SignatureImage, FormError> {
        let text = visual_order(&format!("{} {}", first_name.trim(), last_name.trim()));
        let max_width = CANVAS_WIDTH as f32 - 2.0 * PADDING;

        let mut size = START_SIZE_PX;
        let (glyphs, width) = loop {
            let scale = Scale::uniform(size);
            let glyphs: Vec<PositionedGlyph<'_>> =
                self.font.layout(&text, scale, point(0.0, 0.0)).collect();
            let width = layout_width(&glyphs);
            if width <= max_width || size <= MIN_SIZE_PX {
                break (glyphs, width);
            }
            size -= SIZE_STEP_PX;
        };

        let v_metrics = self.font.v_metrics(Scale::uniform(size));
        let text_height = v_metrics.ascent - v_metrics.descent;
        let baseline = ((CANVAS_HEIGHT as f32 - text_height) / 2.0 + v_metrics.ascent).round();
        let x_offset = ((CANVAS_WIDTH as f32 - width) / 2.0).max(0.0).round();

        let mut canvas = RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, Rgba([0, 0, 0, 0]));
        for glyph in glyphs {
            let x = glyph.position().x + x_offset;
            let glyph = glyph.into_unpositioned().positioned(point(x, baseline));
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px < 0 || py < 0 || px >= CANVAS_WIDTH as i32 || py >= CANVAS_HEIGHT as i32 {
                    return;
                }
                let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                if alpha > pixel[3] {
                    *pixel = Rgba([INK[0], INK[1], INK[2], alpha]);
                }
            });
        }

        debug!(
            "Rendered signature '{}' at {:.0}px with '{}'",
            text, size, self.name
        );
        encode_png(&canvas)
    }
}

/// Pen position after the last glyph, i.e. the advance width of the line.
fn layout_width(glyphs: &[PositionedGlyph<'_>]) -> f32 {
    glyphs
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::find_system_font;

    #[test]
    fn rejects_non_font_bytes() {
        let err = SignatureRenderer::from_bytes("bogus", b"not a font".to_vec())
            .err()
            .expect("should fail");
        assert!(matches!(err, FormError::FontLoadFailed { .. }));
    }

    #[test]
    fn renders_fixed_size_deterministic_png() {
        let Some((path, data)) = find_system_font() else {
            println!("SKIP — no TrueType font found on this system");
            return;
        };
        let renderer = SignatureRenderer::from_bytes(path.display().to_string(), data)
            .expect("system font should load");

        let first = renderer.render("Dana", "Levi").expect("render");
        let second = renderer.render("Dana", "Levi").expect("render");
        assert_eq!(first, second, "rendering must be deterministic");

        let decoded = first.decode().expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert!(
            decoded.pixels().any(|p| p[3] > 0),
            "signature should contain ink"
        );
        assert_eq!(decoded.get_pixel(0, 0)[3], 0, "background stays transparent");
    }

    #[test]
    fn long_names_still_fit_the_canvas() {
        let Some((path, data)) = find_system_font() else {
            println!("SKIP — no TrueType font found on this system");
            return;
        };
        let renderer = SignatureRenderer::from_bytes(path.display().to_string(), data).unwrap();
        let img = renderer
            .render("Alexandra", "Montgomery")
            .expect("render")
            .decode()
            .unwrap();
        // Nothing may be drawn in the outermost columns when the text fits.
        let edge_ink = (0..CANVAS_HEIGHT).any(|y| img.get_pixel(0, y)[3] > 0);
        assert!(!edge_ink);
    }
}
