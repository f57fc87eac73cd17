//! Boundaries to the external perception engines and result consumers.

use image::{DynamicImage, RgbImage};

use crate::types::{Candidate, RecognizedLine, Region, Variant};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Locates candidate plate rectangles in a full image.
pub trait Detector {
    /// Regions in emission order; each crop is in the source color space.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Region>, EngineError>;
}

/// Reads character sequences out of a small plate image.
pub trait Recognizer {
    /// Text lines with per-line confidence in `[0, 1]`.
    ///
    /// Geometry is only filled in when `want_geometry` is set; without it
    /// multi-line plates cannot be put into reading order.
    fn read_text(
        &self,
        image: &DynamicImage,
        want_geometry: bool,
    ) -> Result<Vec<RecognizedLine>, EngineError>;
}

/// Receives every accepted region for archiving.
pub trait ResultSink {
    fn record(&mut self, region: &Region, candidate: &Candidate, variants: &[Variant]);
}

/// Discards everything.
impl ResultSink for () {
    fn record(&mut self, _region: &Region, _candidate: &Candidate, _variants: &[Variant]) {}
}

impl<D: Detector + ?Sized> Detector for &D {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Region>, EngineError> {
        (**self).detect(image)
    }
}

impl<R: Recognizer + ?Sized> Recognizer for &R {
    fn read_text(
        &self,
        image: &DynamicImage,
        want_geometry: bool,
    ) -> Result<Vec<RecognizedLine>, EngineError> {
        (**self).read_text(image, want_geometry)
    }
}
