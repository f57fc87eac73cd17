use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::grammar::PlateGrammar;
use crate::image_impl::Point2f;

/// Inclusive pixel bounding box `(x1, y1)..=(x2, y2)` in source-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1) + 1
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1) + 1
    }
}

/// A detector-reported plate rectangle together with its pixels.
#[derive(Clone, Debug)]
pub struct Region {
    pub crop: RgbImage,
    pub bbox: BBox,
}

impl Region {
    pub fn new(crop: RgbImage, bbox: BBox) -> Self {
        Self { crop, bbox }
    }

    /// Crop `bbox` out of `image`, clamping it to the image bounds.
    ///
    /// Returns `None` when the clamped box is empty.
    pub fn from_bbox(image: &RgbImage, bbox: BBox) -> Option<Self> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 || bbox.x1 >= w || bbox.y1 >= h || bbox.x2 < bbox.x1 || bbox.y2 < bbox.y1 {
            return None;
        }
        let clamped = BBox::new(bbox.x1, bbox.y1, bbox.x2.min(w - 1), bbox.y2.min(h - 1));
        let crop = image::imageops::crop_imm(
            image,
            clamped.x1,
            clamped.y1,
            clamped.width(),
            clamped.height(),
        )
        .to_image();
        Some(Self { crop, bbox: clamped })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RectifyMethod {
    Edge,
    Corner,
    Contour,
    None,
}

impl RectifyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RectifyMethod::Edge => "edge",
            RectifyMethod::Corner => "corner",
            RectifyMethod::Contour => "contour",
            RectifyMethod::None => "none",
        }
    }

    pub fn succeeded(&self) -> bool {
        !matches!(self, RectifyMethod::None)
    }
}

/// Preprocessing recipe that produced a [`Variant`], in generation priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantMethod {
    RectifiedGray,
    RectifiedColor,
    Gray,
    GrayClahe,
    RectifiedBinary,
    Binary,
}

impl VariantMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantMethod::RectifiedGray => "rectified_gray",
            VariantMethod::RectifiedColor => "rectified_color",
            VariantMethod::Gray => "gray",
            VariantMethod::GrayClahe => "gray_clahe",
            VariantMethod::RectifiedBinary => "rectified_binary",
            VariantMethod::Binary => "binary",
        }
    }

    pub fn is_rectified(&self) -> bool {
        matches!(
            self,
            VariantMethod::RectifiedGray | VariantMethod::RectifiedColor | VariantMethod::RectifiedBinary
        )
    }

    pub fn is_binarized(&self) -> bool {
        matches!(self, VariantMethod::RectifiedBinary | VariantMethod::Binary)
    }

    /// Grayscale with neither contrast equalization nor binarization.
    pub fn is_plain_gray(&self) -> bool {
        matches!(self, VariantMethod::RectifiedGray | VariantMethod::Gray)
    }

    /// Kept for hand-off to archivers; not sent to the recognizer by default.
    pub fn is_archival(&self) -> bool {
        matches!(self, VariantMethod::RectifiedColor)
    }
}

impl std::fmt::Display for VariantMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One preprocessed rendering of a region.
#[derive(Clone, Debug)]
pub struct Variant {
    pub image: DynamicImage,
    pub method: VariantMethod,
    pub upscaled: bool,
}

impl Variant {
    pub fn new(image: DynamicImage, method: VariantMethod, upscaled: bool) -> Self {
        Self { image, method, upscaled }
    }
}

/// One text line as returned by the recognition engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    /// Quadrilateral `[top-left, top-right, bottom-right, bottom-left]`, when requested.
    pub geometry: Option<[Point2f; 4]>,
    pub text: String,
    pub confidence: f32,
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            geometry: None,
            text: text.into(),
            confidence,
        }
    }

    pub fn with_geometry(mut self, geometry: [Point2f; 4]) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Center of the line's box, `(x, y)`, from two opposite corners.
    pub fn center(&self) -> Option<(f32, f32)> {
        self.geometry.map(|g| ((g[0].x + g[2].x) / 2.0, (g[0].y + g[2].y) / 2.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Unknown,
}

impl VehicleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully interpreted plate reading from one variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub raw_text: String,
    /// Corrected string, `A-Z0-9` only.
    pub clean_text: String,
    pub formatted_text: String,
    pub vehicle_class: VehicleClass,
    pub is_50cc: bool,
    pub confidence: f32,
    pub method: VariantMethod,
    /// Index of the source variant in generation order.
    pub source_variant: usize,
    /// OCR lines in reading order.
    pub lines: Vec<String>,
    pub province_valid: bool,
}

impl Candidate {
    pub fn is_valid(&self) -> bool {
        self.formatted_text.chars().count() > 5 && self.vehicle_class != VehicleClass::Unknown
    }
}

/// The winning candidate of one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateResult {
    pub formatted_text: String,
    pub vehicle_class: VehicleClass,
    pub bbox: BBox,
    pub source_variant: VariantMethod,
    pub confidence: f32,
}

impl PlateResult {
    pub fn from_candidate(candidate: &Candidate, bbox: BBox) -> Self {
        Self {
            formatted_text: candidate.formatted_text.clone(),
            vehicle_class: candidate.vehicle_class,
            bbox,
            source_variant: candidate.method,
            confidence: candidate.confidence,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    /// When off, regions go straight to variant generation unrectified.
    pub enabled: bool,
    pub blur_sigma: f32,
    /// Canny `(low, high)` pairs, tried in order.
    pub canny_thresholds: Vec<(f32, f32)>,
    pub hough_min_votes: u32,
    /// Vote threshold as a fraction of the region's shorter side.
    pub hough_vote_ratio: f32,
    pub hough_suppression_radius: u32,
    /// Allowed corner overshoot outside the region, as a fraction of its size.
    pub corner_margin: f32,
    pub fast_threshold: u8,
    pub max_corners: usize,
    pub padding: u32,
    pub adaptive_block_radius: u32,
    pub adaptive_c: i32,
    pub close_radius: u8,
    pub max_contours: usize,
    pub epsilon_factors: Vec<f64>,
    pub plate_ratios: Vec<f32>,
    pub min_polygon_score: f32,
    pub min_width: u32,
    pub min_height: u32,
    /// Output may be at most this many times the region's size on each axis.
    pub max_scale: f32,
    pub max_side: u32,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blur_sigma: 1.0,
            canny_thresholds: vec![(50.0, 150.0), (30.0, 100.0)],
            hough_min_votes: 15,
            hough_vote_ratio: 0.4,
            hough_suppression_radius: 8,
            corner_margin: 0.25,
            fast_threshold: 20,
            max_corners: 100,
            padding: 10,
            adaptive_block_radius: 9,
            adaptive_c: 9,
            close_radius: 3,
            max_contours: 5,
            epsilon_factors: vec![0.02, 0.03, 0.04, 0.05],
            plate_ratios: vec![4.5, 1.4],
            min_polygon_score: 0.45,
            min_width: 20,
            min_height: 10,
            max_scale: 3.0,
            max_side: 2000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    pub clahe_clip_limit: f32,
    pub clahe_tiles: (u32, u32),
    pub upscale_factor: u32,
    /// Shorter side below which a base image is upscaled.
    pub upscale_min_side: u32,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_tiles: (8, 8),
            upscale_factor: 2,
            upscale_min_side: 64,
        }
    }
}

/// Composite-score weights. Empirically tuned; treat as configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub early_accept_confidence: f32,
    pub read_color_variant: bool,
    pub short_len_hard: usize,
    pub short_len_hard_penalty: f32,
    pub short_len_soft: usize,
    pub short_len_soft_penalty: f32,
    pub low_conf_hard: f32,
    pub low_conf_hard_penalty: f32,
    pub low_conf_soft: f32,
    pub low_conf_soft_penalty: f32,
    pub adequate_confidence: f32,
    pub adequate_len: usize,
    pub rectified_bonus: f32,
    pub rectified_penalty: f32,
    pub binarized_bonus: f32,
    pub combined_bonus: f32,
    pub plain_gray_penalty: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            early_accept_confidence: 0.85,
            read_color_variant: false,
            short_len_hard: 6,
            short_len_hard_penalty: 0.30,
            short_len_soft: 8,
            short_len_soft_penalty: 0.10,
            low_conf_hard: 0.30,
            low_conf_hard_penalty: 0.20,
            low_conf_soft: 0.50,
            low_conf_soft_penalty: 0.10,
            adequate_confidence: 0.60,
            adequate_len: 7,
            rectified_bonus: 0.05,
            rectified_penalty: 0.10,
            binarized_bonus: 0.03,
            combined_bonus: 0.02,
            plain_gray_penalty: 0.02,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    pub reference_width: u32,
    pub base_thickness: f32,
    pub base_text_height: f32,
    pub base_padding: f32,
    pub car_color: [u8; 3],
    pub motorcycle_color: [u8; 3],
    pub default_color: [u8; 3],
    pub text_color: [u8; 3],
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            reference_width: 1280,
            base_thickness: 3.0,
            base_text_height: 28.0,
            base_padding: 6.0,
            car_color: [255, 165, 0],
            motorcycle_color: [0, 255, 0],
            default_color: [0, 255, 0],
            text_color: [255, 255, 255],
            font_path: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rectify: RectifyConfig,
    pub variants: VariantConfig,
    pub scoring: ScoringConfig,
    pub grammar: PlateGrammar,
    pub annotate: AnnotateConfig,
}

impl PipelineConfig {
    /// Load a config from JSON; absent fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(|e| {
            EngineError::Config(format!("{}: {e}", path.as_ref().display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_region_from_bbox_clamps_to_image() {
        let img = RgbImage::from_pixel(40, 30, Rgb([9, 9, 9]));
        let region = Region::from_bbox(&img, BBox::new(30, 20, 100, 100)).unwrap();
        assert_eq!(region.bbox, BBox::new(30, 20, 39, 29));
        assert_eq!(region.crop.dimensions(), (10, 10));
    }

    #[test]
    fn test_region_from_bbox_outside_image() {
        let img = RgbImage::new(10, 10);
        assert!(Region::from_bbox(&img, BBox::new(12, 0, 20, 5)).is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"scoring": {"early_accept_confidence": 0.9}}"#).unwrap();
        assert_eq!(cfg.scoring.early_accept_confidence, 0.9);
        assert_eq!(cfg.scoring.adequate_len, 7);
        assert_eq!(cfg.rectify.padding, 10);
        assert!(cfg.grammar.is_valid_province(29));
    }

    #[test]
    fn test_method_flags() {
        assert!(VariantMethod::RectifiedBinary.is_rectified());
        assert!(VariantMethod::RectifiedBinary.is_binarized());
        assert!(!VariantMethod::GrayClahe.is_plain_gray());
        assert!(VariantMethod::RectifiedColor.is_archival());
    }
}
