use crate::grammar::{clean, PlateGrammar};
use crate::types::{Candidate, RecognizedLine, VariantMethod};

/// Turns one recognizer reading into a classified, corrected and formatted candidate.
#[derive(Clone, Debug, Default)]
pub struct CandidateBuilder {
    grammar: PlateGrammar,
}

impl CandidateBuilder {
    pub fn new(grammar: PlateGrammar) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> &PlateGrammar {
        &self.grammar
    }

    /// `None` for an empty reading.
    ///
    /// Lines are put in reading order (top row first, then left to right) when
    /// every line carries geometry; otherwise the engine's order is kept.
    pub fn build(
        &self,
        reading: &[RecognizedLine],
        method: VariantMethod,
        source_variant: usize,
    ) -> Option<Candidate> {
        if reading.is_empty() {
            return None;
        }

        let mut ordered: Vec<&RecognizedLine> = reading.iter().collect();
        let centers: Option<Vec<(f32, f32)>> = reading.iter().map(|l| l.center()).collect();
        if centers.is_some() {
            ordered.sort_by(|a, b| {
                let (ax, ay) = a.center().unwrap_or_default();
                let (bx, by) = b.center().unwrap_or_default();
                ay.total_cmp(&by).then(ax.total_cmp(&bx))
            });
        }

        let confidence =
            ordered.iter().map(|l| l.confidence).sum::<f32>() / ordered.len() as f32;
        let lines: Vec<String> = ordered.iter().map(|l| l.text.clone()).collect();

        let (vehicle_class, is_50cc) = self.grammar.classify(&lines);

        let raw_text = lines.concat();
        let corrected = self.grammar.correct(&clean(&raw_text), is_50cc);
        let clean_text: String = corrected.chars().take(self.grammar.max_len).collect();

        let province_valid = self.grammar.province_valid(&clean_text);
        if !province_valid && clean_text.len() >= 2 {
            log::warn!("invalid province code in {:?} ({})", clean_text, method);
        }

        let formatted_text = self.grammar.format(&clean_text, vehicle_class, is_50cc);
        log::debug!(
            "[{}] {:?} -> {} ({}, conf {:.3})",
            method,
            raw_text,
            formatted_text,
            vehicle_class,
            confidence
        );

        Some(Candidate {
            raw_text,
            clean_text,
            formatted_text,
            vehicle_class,
            is_50cc,
            confidence,
            method,
            source_variant,
            lines,
            province_valid,
        })
    }
}
