use crate::detection::Detection;
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // rough per-character estimate
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 165, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws detection boxes and confidence labels onto a copy of the source
/// image. The source is never mutated.
pub struct BoxRenderer {
    font: FontRef<'static>,
}

impl BoxRenderer {
    pub fn new() -> Self {
        let font_data: &'static [u8] = include_bytes!("../assets/DejaVuSans.ttf");
        let font = FontRef::try_from_slice(font_data).expect("embedded font must parse");
        Self { font }
    }

    pub fn render(&self, source: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = source.clone();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);

        // Inverted boxes arrive as-is from the post-processor; draw between
        // whichever corners the model produced.
        let x0 = detection.x.min(detection.x + detection.ancho).clamp(0, w - 1);
        let y0 = detection.y.min(detection.y + detection.alto).clamp(0, h - 1);
        let x1 = detection.x.max(detection.x + detection.ancho).clamp(0, w - 1);
        let y1 = detection.y.max(detection.y + detection.alto).clamp(0, h - 1);

        for t in 0..BOX_THICKNESS {
            let rect_w = x1 - x0 - 2 * t;
            let rect_h = y1 - y0 - 2 * t;
            if rect_w <= 0 || rect_h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x0 + t, y0 + t).of_size(rect_w as u32, rect_h as u32),
                BOX_COLOR,
            );
        }

        let label = format!("Persona: {}%", detection.confianza_porcentaje);
        let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;

        // Labels sit above the top edge; near the image top they clamp into
        // frame instead of erroring.
        let label_x = x0;
        let label_y = (y0 - LABEL_TEXT_HEIGHT).max(0);
        let label_width = text_width.min((w - label_x).max(0));

        if label_width > 0 {
            draw_filled_rect_mut(
                canvas,
                Rect::at(label_x, label_y).of_size(label_width as u32, LABEL_TEXT_HEIGHT as u32),
                LABEL_BACKGROUND,
            );
            draw_text_mut(
                canvas,
                TEXT_COLOR,
                label_x,
                label_y + LABEL_TEXT_VERTICAL_PADDING,
                PxScale::from(LABEL_FONT_SIZE),
                &self.font,
                &label,
            );
        }
    }
}

impl Default for BoxRenderer {
    fn default() -> Self {
        Self::new()
    }
}
