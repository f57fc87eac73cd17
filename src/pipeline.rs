use std::time::Instant;

use image::RgbImage;

use crate::annotate::Annotator;
use crate::candidate::CandidateBuilder;
use crate::engine::{Detector, EngineError, Recognizer, ResultSink};
use crate::preprocess::VariantGenerator;
use crate::rectify::GeometricRectifier;
use crate::select::CandidateSelector;
use crate::types::{Candidate, PipelineConfig, PlateResult, Region, Variant};

/// Annotated copy of the input plus one result per recognized region, in detector order.
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub annotated: RgbImage,
    pub plates: Vec<PlateResult>,
}

/// Detector → rectifier → variants → selector, per region, then annotation.
pub struct PlatePipeline<D, R> {
    detector: D,
    recognizer: R,
    generator: VariantGenerator,
    selector: CandidateSelector,
    annotator: Annotator,
}

impl<D: Detector, R: Recognizer> PlatePipeline<D, R> {
    pub fn new(detector: D, recognizer: R, config: PipelineConfig) -> Result<Self, EngineError> {
        let PipelineConfig { rectify, variants, scoring, grammar, annotate } = config;
        Ok(Self {
            detector,
            recognizer,
            generator: VariantGenerator::new(GeometricRectifier::new(rectify), variants),
            selector: CandidateSelector::new(CandidateBuilder::new(grammar), scoring),
            annotator: Annotator::new(annotate)?,
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn generator(&self) -> &VariantGenerator {
        &self.generator
    }

    pub fn selector(&self) -> &CandidateSelector {
        &self.selector
    }

    pub fn process(&self, image: &RgbImage) -> Result<ProcessOutput, EngineError> {
        self.process_with_sink(image, &mut ())
    }

    /// Like [`process`](Self::process), handing every accepted region to `sink`.
    ///
    /// Only a detector failure is an error; regions without a valid reading
    /// are skipped.
    pub fn process_with_sink<S: ResultSink + ?Sized>(
        &self,
        image: &RgbImage,
        sink: &mut S,
    ) -> Result<ProcessOutput, EngineError> {
        let start = Instant::now();
        let regions = self.detector.detect(image)?;

        let mut plates = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            match self.process_region(region) {
                Some((candidate, variants)) => {
                    sink.record(region, &candidate, &variants);
                    plates.push(PlateResult::from_candidate(&candidate, region.bbox));
                }
                None => log::debug!("region {} ({:?}): no valid reading", index, region.bbox),
            }
        }

        let annotated = self.annotator.annotate(image, &plates);
        log::info!(
            "{} of {} regions recognized in {:?}",
            plates.len(),
            regions.len(),
            start.elapsed()
        );
        Ok(ProcessOutput { annotated, plates })
    }

    /// Winning candidate of one region together with the variants it was chosen from.
    pub fn process_region(&self, region: &Region) -> Option<(Candidate, Vec<Variant>)> {
        let variants = self.generator.generate(region, true);
        let candidate = self.selector.select(&self.recognizer, &variants)?;
        Some((candidate, variants))
    }

    /// Each image independently; a detector failure only affects its own entry.
    pub fn process_batch(&self, images: &[RgbImage]) -> Vec<Result<ProcessOutput, EngineError>> {
        images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                let out = self.process(image);
                if let Err(e) = &out {
                    log::warn!("image {}: {}", i, e);
                }
                out
            })
            .collect()
    }
}
