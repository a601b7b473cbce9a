use crate::detection::Detection;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::Path;
use thiserror::Error;

const BOX_THICKNESS: i32 = 2;
const LABEL_HEIGHT: u32 = 16;
const LABEL_SCALE: f32 = 14.0;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read font file: {0}")]
    FontRead(#[from] std::io::Error),
    #[error("Invalid font file: {0}")]
    InvalidFont(String),
}

/// Burns detection overlays into copies of frames.
#[derive(Default)]
pub struct Renderer {
    font: Option<FontVec>,
}

impl Renderer {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    pub fn from_font_file(path: Option<&Path>) -> Result<Self, RenderError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = std::fs::read(path)?;
        let font =
            FontVec::try_from_vec(bytes).map_err(|e| RenderError::InvalidFont(e.to_string()))?;
        Ok(Self::new(Some(font)))
    }

    /// Returns a copy of `frame` with boxes, label tabs and, when a font is
    /// loaded, `label: confidence` captions. `frame` itself is untouched.
    pub fn render(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = frame.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        for detection in detections {
            let Some(bounds) = clamp_box(detection, width, height) else {
                continue;
            };
            let color = Rgb(detection.color);

            for inset in 0..BOX_THICKNESS {
                if let Some(rect) = shrink(bounds, inset) {
                    draw_hollow_rect_mut(&mut canvas, rect, color);
                }
            }

            self.draw_label(&mut canvas, detection, bounds, color);
        }

        canvas
    }

    fn draw_label(
        &self,
        canvas: &mut RgbImage,
        detection: &Detection,
        bounds: Rect,
        color: Rgb<u8>,
    ) {
        let caption = format!("{}: {:.2}", detection.class_label, detection.confidence);
        let scale = PxScale::from(LABEL_SCALE);

        let tab_width = match &self.font {
            Some(font) => text_size(scale, font, &caption).0 + 4,
            None => bounds.width().min(LABEL_HEIGHT * 2),
        };
        let tab_y = (bounds.top() - LABEL_HEIGHT as i32).max(0);
        let tab_width = tab_width
            .min(canvas.width().saturating_sub(bounds.left() as u32))
            .max(1);
        let tab = Rect::at(bounds.left(), tab_y)
            .of_size(tab_width, LABEL_HEIGHT.min(canvas.height()));
        draw_filled_rect_mut(canvas, tab, color);

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                TEXT_COLOR,
                bounds.left() + 2,
                tab_y + 1,
                scale,
                font,
                &caption,
            );
        }
    }
}

fn clamp_box(detection: &Detection, width: u32, height: u32) -> Option<Rect> {
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x1 = detection.x1.clamp(0.0, max_x).round() as i32;
    let y1 = detection.y1.clamp(0.0, max_y).round() as i32;
    let x2 = detection.x2.clamp(0.0, max_x).round() as i32;
    let y2 = detection.y2.clamp(0.0, max_y).round() as i32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

fn shrink(rect: Rect, inset: i32) -> Option<Rect> {
    let width = rect.width() as i32 - 2 * inset;
    let height = rect.height() as i32 - 2 * inset;
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Rect::at(rect.left() + inset, rect.top() + inset).of_size(width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class_id: 0,
            class_label: "cocci".to_string(),
            color: [255, 0, 0],
            confidence: 0.87,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn test_render_draws_on_copy() {
        let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let renderer = Renderer::default();

        let rendered = renderer.render(&frame, &[detection(20.0, 30.0, 80.0, 90.0)]);

        assert_eq!(rendered.dimensions(), frame.dimensions());
        assert_eq!(rendered.get_pixel(20, 60), &Rgb([255, 0, 0]));
        assert_eq!(rendered.get_pixel(21, 60), &Rgb([255, 0, 0]));
        assert_eq!(rendered.get_pixel(50, 60), &Rgb([0, 0, 0]));
        assert!(frame.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_render_clamps_out_of_bounds_boxes() {
        let frame = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        let renderer = Renderer::default();

        let rendered = renderer.render(
            &frame,
            &[
                detection(-50.0, -50.0, 500.0, 500.0),
                detection(60.0, 60.0, 90.0, 90.0),
            ],
        );

        assert_eq!(rendered.get_pixel(39, 20), &Rgb([255, 0, 0]));
        assert_eq!(rendered.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_without_detections_is_identity() {
        let frame = RgbImage::from_fn(16, 8, |x, y| Rgb([x as u8, y as u8, 7]));
        let rendered = Renderer::default().render(&frame, &[]);
        assert_eq!(rendered, frame);
    }

    #[test]
    fn test_missing_font_file() {
        let result = Renderer::from_font_file(Some(Path::new("./no_such_font.ttf")));
        assert!(matches!(result, Err(RenderError::FontRead(_))));
    }
}
