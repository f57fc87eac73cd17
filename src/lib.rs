//! # platenorm - Vehicle Plate Normalization
//!
//! Turns the noisy output of an external plate detector and text recognizer
//! into one validated, correctly formatted plate string per vehicle.
//!
//! ## Pipeline
//!
//! - **Rectification**: perspective correction of each detected region, trying
//!   edge lines, then interest-point corners, then contour polygons
//! - **Variants**: grayscale, CLAHE-equalized and Otsu-binarized renderings of
//!   the rectified and original crops, in fixed priority order
//! - **Selection**: every variant is read; early exit on a high-confidence
//!   reading, otherwise a composite score picks the winner
//! - **Grammar**: positional glyph correction, vehicle classification and
//!   format reconstruction, all driven by swappable table data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use platenorm::{Detector, EngineError, PipelineConfig, PlatePipeline, Recognizer};
//! use platenorm::{RecognizedLine, Region};
//! use image::{DynamicImage, RgbImage};
//!
//! struct MyDetector;
//! impl Detector for MyDetector {
//!     fn detect(&self, _image: &RgbImage) -> Result<Vec<Region>, EngineError> {
//!         Ok(vec![])
//!     }
//! }
//!
//! struct MyRecognizer;
//! impl Recognizer for MyRecognizer {
//!     fn read_text(&self, _: &DynamicImage, _: bool) -> Result<Vec<RecognizedLine>, EngineError> {
//!         Ok(vec![])
//!     }
//! }
//!
//! let pipeline = PlatePipeline::new(MyDetector, MyRecognizer, PipelineConfig::default())?;
//! let image = image::open("car.jpg")?.to_rgb8();
//! let output = pipeline.process(&image)?;
//!
//! for plate in &output.plates {
//!     println!("{} ({})", plate.formatted_text, plate.vehicle_class);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod annotate;
mod candidate;
mod contours;
mod engine;
mod geometry;
mod grammar;
mod image_impl;
mod pipeline;
mod preprocess;
mod rectify;
mod select;
mod types;

pub use crate::annotate::{label_origin, Annotator, Style};
pub use crate::candidate::CandidateBuilder;
pub use crate::engine::{Detector, EngineError, Recognizer, ResultSink};
pub use crate::grammar::{clean, FormatRule, PlateGrammar, PlateLayout};
pub use crate::image_impl::Point2f;
pub use crate::pipeline::{PlatePipeline, ProcessOutput};
pub use crate::preprocess::{clahe, otsu_binarize, VariantGenerator};
pub use crate::rectify::{GeometricRectifier, Rectified};
pub use crate::select::CandidateSelector;
pub use crate::types::{
    AnnotateConfig, BBox, Candidate, PipelineConfig, PlateResult, RecognizedLine, RectifyConfig,
    RectifyMethod, Region, ScoringConfig, Variant, VariantConfig, VariantMethod, VehicleClass,
};
