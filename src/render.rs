//! Drawing surface for frames and detection overlays.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0x00, 0xff, 0x00]);
const TEXT_COLOR: Rgb<u8> = Rgb([0x00, 0x00, 0x00]);
const LINE_WIDTH: i32 = 2;
const TAG_HEIGHT: i32 = 20;
const TAG_PADDING: i32 = 10;
const TEXT_INSET: i32 = 5;
const FONT_PX: f32 = 16.0;
/// Average advance of a 16px sans-serif glyph, used when no font is loaded.
const FALLBACK_GLYPH_WIDTH: i32 = 9;
const MAX_PX: f32 = 1.0e7;

/// Something the detection loop can draw each iteration onto.
pub trait RenderSurface {
    /// Draw `frame` and an overlay for every detection.
    fn draw(&mut self, frame: &Frame, detections: &[Detection]) -> Result<()>;

    /// The last drawn image, for snapshots. Surfaces that keep no pixels return `None`.
    fn snapshot(&self) -> Option<&RgbImage> {
        None
    }
}

/// In-memory RGB canvas.
///
/// Each draw resizes the canvas to the frame's native resolution, so the drawn
/// image always matches the source frame pixel for pixel.
pub struct Canvas {
    image: RgbImage,
    font: Option<FontVec>,
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            image: RgbImage::new(0, 0),
            font: None,
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(self.with_font(font))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn text_width(&self, text: &str) -> i32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(FONT_PX), font, text).0 as i32,
            None => text.chars().count() as i32 * FALLBACK_GLYPH_WIDTH,
        }
    }

    /// Part of the rectangle that lies on the canvas, if any.
    fn clip(&self, x: i64, y: i64, width: i64, height: i64) -> Option<Rect> {
        let left = x.max(0);
        let top = y.max(0);
        let right = x.saturating_add(width).min(i64::from(self.image.width()));
        let bottom = y.saturating_add(height).min(i64::from(self.image.height()));
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
    }

    fn fill(&mut self, x: i64, y: i64, width: i64, height: i64) -> bool {
        match self.clip(x, y, width, height) {
            Some(rect) => {
                draw_filled_rect_mut(&mut self.image, rect, BOX_COLOR);
                true
            }
            None => false,
        }
    }

    fn draw_detection(&mut self, detection: &Detection) {
        let x = to_px(detection.bbox.x);
        let y = to_px(detection.bbox.y);
        let width = to_px(detection.bbox.width).max(1);
        let height = to_px(detection.bbox.height).max(1);
        let line = i64::from(LINE_WIDTH);

        // Outline as four strips so a partly visible box is clipped, not redrawn at the edge.
        self.fill(x, y, width, line.min(height));
        self.fill(x, y + height - line.min(height), width, line.min(height));
        self.fill(x, y, line.min(width), height);
        self.fill(x + width - line.min(width), y, line.min(width), height);

        let label = detection.label_text();
        let tag_width = i64::from((self.text_width(&label) + TAG_PADDING).max(1));
        let tag_height = i64::from(TAG_HEIGHT);
        if !self.fill(x, y - tag_height, tag_width, tag_height) {
            return;
        }

        if let Some(font) = &self.font {
            // Baseline sits TEXT_INSET above the box; imageproc positions by the top edge.
            // The tag is on the canvas, so both coordinates fit in i32.
            let left = (x + i64::from(TEXT_INSET)) as i32;
            let top = (y - i64::from(TEXT_INSET) - FONT_PX as i64 + 3) as i32;
            draw_text_mut(
                &mut self.image,
                TEXT_COLOR,
                left,
                top,
                PxScale::from(FONT_PX),
                font,
                &label,
            );
        }
    }
}

/// Round a box coordinate to whole pixels, bounded so sums of coordinates cannot overflow.
fn to_px(value: f32) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(-MAX_PX, MAX_PX) as i64
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for Canvas {
    fn draw(&mut self, frame: &Frame, detections: &[Detection]) -> Result<()> {
        self.image = frame.to_rgb_image()?;
        for detection in detections {
            self.draw_detection(detection);
        }
        Ok(())
    }

    fn snapshot(&self) -> Option<&RgbImage> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return None;
        }
        Some(&self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            label: "cat".to_string(),
            confidence: 87,
            bbox: BoundingBox::new(x, y, w, h),
        }
    }

    #[test]
    fn resizes_to_frame_and_draws_frame_only_without_detections() -> Result<()> {
        let mut canvas = Canvas::new();
        let frame = Frame::filled(40, 30, [7, 8, 9])?;
        canvas.draw(&frame, &[])?;
        assert_eq!(canvas.dimensions(), (40, 30));
        assert!(canvas.image().pixels().all(|p| p.0 == [7, 8, 9]));
        Ok(())
    }

    #[test]
    fn draws_box_outline_and_tag() -> Result<()> {
        let mut canvas = Canvas::new();
        let frame = Frame::filled(200, 150, [0, 0, 0])?;
        canvas.draw(&frame, &[detection(50.0, 60.0, 80.0, 40.0)])?;
        let img = canvas.image();

        // Two-pixel stroke on the left edge, interior untouched.
        assert_eq!(img.get_pixel(50, 80).0, BOX_COLOR.0);
        assert_eq!(img.get_pixel(51, 80).0, BOX_COLOR.0);
        assert_eq!(img.get_pixel(52, 80).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(90, 80).0, [0, 0, 0]);
        // Tag fill just above the box.
        assert_eq!(img.get_pixel(55, 45).0, BOX_COLOR.0);
        // Nothing drawn above the tag.
        assert_eq!(img.get_pixel(55, 30).0, [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn redraw_at_new_resolution_replaces_previous_image() -> Result<()> {
        let mut canvas = Canvas::new();
        canvas.draw(&Frame::filled(20, 20, [1, 1, 1])?, &[detection(2.0, 2.0, 5.0, 5.0)])?;
        canvas.draw(&Frame::filled(8, 6, [3, 3, 3])?, &[])?;
        assert_eq!(canvas.dimensions(), (8, 6));
        assert!(canvas.image().pixels().all(|p| p.0 == [3, 3, 3]));
        Ok(())
    }

    #[test]
    fn snapshot_is_empty_until_first_draw() -> Result<()> {
        let mut canvas = Canvas::new();
        assert!(canvas.snapshot().is_none());
        canvas.draw(&Frame::filled(4, 4, [9, 9, 9])?, &[])?;
        assert_eq!(canvas.snapshot().map(|img| img.dimensions()), Some((4, 4)));
        Ok(())
    }

    #[test]
    fn far_out_of_range_boxes_are_skipped() -> Result<()> {
        let mut canvas = Canvas::new();
        let frame = Frame::filled(40, 40, [0, 0, 0])?;
        canvas.draw(
            &frame,
            &[
                detection(10.0, -3.0e9, 20.0, 20.0),
                detection(2.0e9, 10.0, 1.0e9, 20.0),
                detection(-5.0e9, -5.0e9, 1.0e10, 1.0e10),
            ],
        )?;
        assert_eq!(canvas.dimensions(), (40, 40));
        assert!(canvas.image().pixels().all(|p| p.0 == [0, 0, 0]));
        Ok(())
    }

    #[test]
    fn box_above_the_canvas_draws_only_its_visible_edges() -> Result<()> {
        let mut canvas = Canvas::new();
        let frame = Frame::filled(30, 30, [0, 0, 0])?;
        canvas.draw(&frame, &[detection(5.0, -10.0, 10.0, 20.0)])?;
        let img = canvas.image();
        // Bottom edge and the lower part of the sides are visible, the top edge is not.
        assert_eq!(img.get_pixel(8, 9).0, BOX_COLOR.0);
        assert_eq!(img.get_pixel(5, 2).0, BOX_COLOR.0);
        assert_eq!(img.get_pixel(8, 0).0, [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn boxes_off_the_edge_are_clipped() -> Result<()> {
        let mut canvas = Canvas::new();
        let frame = Frame::filled(30, 30, [0, 0, 0])?;
        canvas.draw(&frame, &[detection(20.0, 5.0, 50.0, 50.0)])?;
        assert_eq!(canvas.image().get_pixel(20, 10).0, BOX_COLOR.0);
        Ok(())
    }
}
