use std::fs;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::engine::EngineError;
use crate::types::{AnnotateConfig, BBox, PlateResult, VehicleClass};

/// Stroke and label dimensions for one image, scaled from the reference width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Style {
    pub thickness: u32,
    pub text_height: f32,
    pub padding: u32,
}

/// Draws plate boxes and labels onto a copy of the source image.
pub struct Annotator {
    cfg: AnnotateConfig,
    font: Option<FontVec>,
}

impl Annotator {
    /// Loads the label font from `cfg.font_path` if one is set.
    pub fn new(cfg: AnnotateConfig) -> Result<Self, EngineError> {
        let font = match &cfg.font_path {
            Some(path) => {
                let bytes = fs::read(path)?;
                let font = FontVec::try_from_vec(bytes).map_err(|e| {
                    EngineError::Config(format!("invalid font {}: {e}", path.display()))
                })?;
                Some(font)
            }
            None => {
                log::info!("no label font configured; drawing boxes and label bars only");
                None
            }
        };
        Ok(Self { cfg, font })
    }

    pub fn with_font(cfg: AnnotateConfig, font: FontVec) -> Self {
        Self { cfg, font: Some(font) }
    }

    pub fn style_for_width(&self, width: u32) -> Style {
        let s = width as f32 / self.cfg.reference_width.max(1) as f32;
        Style {
            thickness: ((self.cfg.base_thickness * s).round() as u32).max(1),
            text_height: (self.cfg.base_text_height * s).round().max(12.0),
            padding: ((self.cfg.base_padding * s).round() as u32).max(2),
        }
    }

    fn color_for(&self, class: VehicleClass) -> Rgb<u8> {
        match class {
            VehicleClass::Car => Rgb(self.cfg.car_color),
            VehicleClass::Motorcycle => Rgb(self.cfg.motorcycle_color),
            VehicleClass::Unknown => Rgb(self.cfg.default_color),
        }
    }

    fn label_text_size(&self, text: &str, height: f32) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(height), font, text),
            None => (
                (0.6 * height * text.chars().count() as f32).round() as u32,
                height.round() as u32,
            ),
        }
    }

    pub fn annotate(&self, image: &RgbImage, results: &[PlateResult]) -> RgbImage {
        let mut canvas = image.clone();
        let (img_w, img_h) = canvas.dimensions();
        if img_w == 0 || img_h == 0 {
            return canvas;
        }
        let style = self.style_for_width(img_w);

        for result in results {
            let color = self.color_for(result.vehicle_class);
            draw_thick_box(&mut canvas, &result.bbox, style.thickness, color);

            let (text_w, text_h) = self.label_text_size(&result.formatted_text, style.text_height);
            let label = (text_w + 2 * style.padding, text_h + 2 * style.padding);
            let (x, y) = label_origin(&result.bbox, label, (img_w, img_h));

            let bar_w = label.0.min(img_w);
            let bar_h = label.1.min(img_h);
            if bar_w > 0 && bar_h > 0 {
                draw_filled_rect_mut(&mut canvas, Rect::at(x, y).of_size(bar_w, bar_h), color);
            }
            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    Rgb(self.cfg.text_color),
                    x + style.padding as i32,
                    y + style.padding as i32,
                    PxScale::from(style.text_height),
                    font,
                    &result.formatted_text,
                );
            }
        }
        canvas
    }
}

/// Hollow rectangle grown inward to `thickness` pixels.
fn draw_thick_box(canvas: &mut RgbImage, bbox: &BBox, thickness: u32, color: Rgb<u8>) {
    let (w, h) = (bbox.width(), bbox.height());
    for t in 0..thickness {
        if 2 * t >= w || 2 * t >= h {
            break;
        }
        let rect = Rect::at((bbox.x1 + t) as i32, (bbox.y1 + t) as i32).of_size(w - 2 * t, h - 2 * t);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Top-left of the label bar: above the box, below it if that leaves the
/// top edge, pulled left if it would leave the right edge.
pub fn label_origin(bbox: &BBox, label: (u32, u32), image: (u32, u32)) -> (i32, i32) {
    let (label_w, label_h) = (label.0 as i32, label.1 as i32);
    let (img_w, img_h) = (image.0 as i32, image.1 as i32);

    let mut x = bbox.x1 as i32;
    let mut y = bbox.y1 as i32 - label_h;
    if y < 0 {
        y = bbox.y2 as i32 + 1;
    }
    if x + label_w > img_w {
        x = img_w - label_w;
    }

    (x.max(0), y.min(img_h - label_h).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariantMethod;

    fn result(bbox: BBox, class: VehicleClass) -> PlateResult {
        PlateResult {
            formatted_text: "30A-123.45".to_string(),
            vehicle_class: class,
            bbox,
            source_variant: VariantMethod::Gray,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_style_scales_with_width() {
        let a = Annotator::new(AnnotateConfig::default()).unwrap();
        assert_eq!(
            a.style_for_width(1280),
            Style { thickness: 3, text_height: 28.0, padding: 6 }
        );
        assert_eq!(
            a.style_for_width(2560),
            Style { thickness: 6, text_height: 56.0, padding: 12 }
        );
        let small = a.style_for_width(200);
        assert_eq!(small.thickness, 1);
        assert_eq!(small.text_height, 12.0);
        assert_eq!(small.padding, 2);
    }

    #[test]
    fn test_label_above_box() {
        let origin = label_origin(&BBox::new(100, 100, 200, 150), (80, 30), (640, 480));
        assert_eq!(origin, (100, 70));
    }

    #[test]
    fn test_label_flips_below_at_top_edge() {
        let origin = label_origin(&BBox::new(100, 10, 200, 50), (80, 30), (640, 480));
        assert_eq!(origin, (100, 51));
    }

    #[test]
    fn test_label_shifts_left_at_right_edge() {
        let origin = label_origin(&BBox::new(600, 100, 639, 150), (80, 30), (640, 480));
        assert_eq!(origin, (560, 70));
    }

    #[test]
    fn test_box_color_by_class() {
        let a = Annotator::new(AnnotateConfig::default()).unwrap();
        let img = RgbImage::new(320, 240);
        let out = a.annotate(
            &img,
            &[
                result(BBox::new(20, 100, 120, 140), VehicleClass::Car),
                result(BBox::new(180, 100, 300, 140), VehicleClass::Motorcycle),
            ],
        );
        assert_eq!(*out.get_pixel(20, 120), Rgb([255, 165, 0]));
        assert_eq!(*out.get_pixel(300, 120), Rgb([0, 255, 0]));
        // Interior untouched.
        assert_eq!(*out.get_pixel(70, 120), Rgb([0, 0, 0]));
        // Source image is not modified.
        assert_eq!(*img.get_pixel(20, 120), Rgb([0, 0, 0]));
    }
}
