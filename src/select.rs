use crate::candidate::CandidateBuilder;
use crate::engine::Recognizer;
use crate::types::{Candidate, ScoringConfig, Variant};

/// Reads each variant in priority order and picks the best candidate.
#[derive(Clone, Debug, Default)]
pub struct CandidateSelector {
    builder: CandidateBuilder,
    cfg: ScoringConfig,
}

impl CandidateSelector {
    pub fn new(builder: CandidateBuilder, cfg: ScoringConfig) -> Self {
        Self { builder, cfg }
    }

    pub fn builder(&self) -> &CandidateBuilder {
        &self.builder
    }

    /// Best valid candidate over `variants`, or `None` if no variant yields one.
    ///
    /// A valid candidate above the early-accept confidence is returned at once
    /// and later variants are never read.
    pub fn select<R: Recognizer + ?Sized>(
        &self,
        recognizer: &R,
        variants: &[Variant],
    ) -> Option<Candidate> {
        let mut valid: Vec<Candidate> = Vec::new();

        for (index, variant) in variants.iter().enumerate() {
            if variant.method.is_archival() && !self.cfg.read_color_variant {
                continue;
            }

            let reading = match recognizer.read_text(&variant.image, true) {
                Ok(lines) => lines,
                Err(e) => {
                    log::warn!("recognizer failed on {}: {}", variant.method, e);
                    continue;
                }
            };

            let Some(candidate) = self.builder.build(&reading, variant.method, index) else {
                log::debug!("[{}] no text", variant.method);
                continue;
            };
            if !candidate.is_valid() {
                log::debug!("[{}] rejected {:?}", variant.method, candidate.formatted_text);
                continue;
            }

            if candidate.confidence > self.cfg.early_accept_confidence {
                log::debug!(
                    "[{}] early accept {} ({:.3})",
                    variant.method,
                    candidate.formatted_text,
                    candidate.confidence
                );
                return Some(candidate);
            }
            valid.push(candidate);
        }

        let count = valid.len();
        let mut best: Option<(f32, Candidate)> = None;
        for candidate in valid {
            let score = self.composite_score(&candidate);
            // Strict comparison keeps the earliest variant on ties.
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }

        let (score, winner) = best?;
        if count > 1 {
            log::info!(
                "selected {} from {} candidates ({}, conf {:.3}, score {:.3})",
                winner.formatted_text,
                count,
                winner.method,
                winner.confidence,
                score
            );
        }
        Some(winner)
    }

    /// Confidence adjusted for length, variant kind and rectification reliability.
    pub fn composite_score(&self, candidate: &Candidate) -> f32 {
        let cfg = &self.cfg;
        let len = candidate.clean_text.chars().count();
        let conf = candidate.confidence;
        let mut score = conf;

        if len < cfg.short_len_hard {
            score -= cfg.short_len_hard_penalty;
        } else if len < cfg.short_len_soft {
            score -= cfg.short_len_soft_penalty;
        }

        if conf < cfg.low_conf_hard {
            score -= cfg.low_conf_hard_penalty;
        } else if conf < cfg.low_conf_soft {
            score -= cfg.low_conf_soft_penalty;
        }

        let adequate = conf >= cfg.adequate_confidence && len >= cfg.adequate_len;
        let method = candidate.method;

        let rectified_bonus = method.is_rectified() && adequate;
        if method.is_rectified() {
            if adequate {
                score += cfg.rectified_bonus;
            } else {
                score -= cfg.rectified_penalty;
            }
        }

        let binarized_bonus = method.is_binarized() && adequate;
        if binarized_bonus {
            score += cfg.binarized_bonus;
        }
        if rectified_bonus && binarized_bonus {
            score += cfg.combined_bonus;
        }

        if method.is_plain_gray() {
            score -= cfg.plain_gray_penalty;
        }

        score
    }
}
