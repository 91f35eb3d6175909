//! Free-hand signature capture on a fixed-size drawing surface.
//!
//! The pad mirrors the modal a signature canvas lives in: it is opened,
//! strokes are drawn, and either `clear` wipes the strokes or `save`
//! commits them and closes the pad. A previously saved signature lives on
//! the record, not on the pad, so clearing never touches it.

use super::{encode_png, SignatureImage};
use crate::error::FormError;
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Drawing surface width in pixels.
pub const PAD_WIDTH: u32 = 500;
/// Drawing surface height in pixels.
pub const PAD_HEIGHT: u32 = 200;

const PEN_WIDTH: f32 = 2.5;
const INK: [u8; 3] = [0, 0, 0];
/// Distance between stamped pen positions along a segment, in pixels.
const SAMPLE_STEP: f32 = 0.5;

/// A free-hand drawing surface producing a [`SignatureImage`].
#[derive(Debug, Clone)]
pub struct SignaturePad {
    width: u32,
    height: u32,
    strokes: Vec<Vec<(f32, f32)>>,
    open: bool,
}

impl Default for SignaturePad {
    fn default() -> Self {
        Self::new()
    }
}

impl SignaturePad {
    /// A closed pad with the standard surface size.
    pub fn new() -> Self {
        Self {
            width: PAD_WIDTH,
            height: PAD_HEIGHT,
            strokes: Vec::new(),
            open: false,
        }
    }

    /// Open the pad with an empty surface.
    pub fn open(&mut self) {
        self.strokes.clear();
        self.open = true;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// True when nothing has been drawn since the last open/clear.
    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(|s| s.is_empty())
    }

    /// Start a new stroke at `(x, y)`. Ignored while the pad is closed.
    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        if !self.open {
            return;
        }
        let p = self.clamp(x, y);
        self.strokes.push(vec![p]);
    }

    /// Extend the current stroke to `(x, y)`.
    pub fn extend_stroke(&mut self, x: f32, y: f32) {
        if !self.open {
            return;
        }
        let p = self.clamp(x, y);
        match self.strokes.last_mut() {
            Some(stroke) => stroke.push(p),
            None => self.strokes.push(vec![p]),
        }
    }

    /// Discard every in-progress stroke. The pad stays open.
    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    /// Close without saving.
    pub fn cancel(&mut self) {
        self.strokes.clear();
        self.open = false;
    }

    /// Commit the strokes as a PNG and close the pad.
    ///
    /// Saving an empty surface is a no-op: `Ok(None)` is returned and the pad
    /// stays open so the user can draw.
    pub fn save(&mut self) -> Result<Option<SignatureImage>, FormError> {
        if !self.open || self.is_empty() {
            debug!("Ignoring save of an empty signature pad");
            return Ok(None);
        }
        let image = encode_png(&self.rasterise())?;
        self.strokes.clear();
        self.open = false;
        Ok(Some(image))
    }

    fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(0.0, (self.width - 1) as f32),
            y.clamp(0.0, (self.height - 1) as f32),
        )
    }

    fn rasterise(&self) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, Rgba([0, 0, 0, 0]));
        for stroke in &self.strokes {
            match stroke.as_slice() {
                [] => {}
                [only] => stamp_pen(&mut canvas, *only),
                points => {
                    for pair in points.windows(2) {
                        draw_segment(&mut canvas, pair[0], pair[1]);
                    }
                }
            }
        }
        canvas
    }
}

fn draw_segment(canvas: &mut RgbaImage, from: (f32, f32), to: (f32, f32)) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    let steps = (length / SAMPLE_STEP).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        stamp_pen(canvas, (from.0 + dx * t, from.1 + dy * t));
    }
}

/// Paint an anti-aliased disc of the pen's width centred on `center`.
fn stamp_pen(canvas: &mut RgbaImage, center: (f32, f32)) {
    let radius = PEN_WIDTH / 2.0;
    let reach = radius.ceil() as i32 + 1;
    let (cx, cy) = center;
    for oy in -reach..=reach {
        for ox in -reach..=reach {
            let px = cx.floor() as i32 + ox;
            let py = cy.floor() as i32 + oy;
            if px < 0 || py < 0 || px >= canvas.width() as i32 || py >= canvas.height() as i32 {
                continue;
            }
            let (fx, fy) = (px as f32 + 0.5 - cx, py as f32 + 0.5 - cy);
            let distance = (fx * fx + fy * fy).sqrt();
            let coverage = (radius + 0.5 - distance).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let alpha = (coverage * 255.0).round() as u8;
            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            if alpha > pixel[3] {
                *pixel = Rgba([INK[0], INK[1], INK[2], alpha]);
            }
        }
    }
}
