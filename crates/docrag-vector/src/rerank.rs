//! Additive re-ranking of raw similarity hits.
//!
//! The similarity threshold is an admission gate applied to the raw cosine;
//! boosts only reorder what got in. Adjusted scores are clipped to `[0, 1]`
//! so they compare with normalised keyword scores.

use std::sync::Arc;

use docrag_core::config::{BoostConfig, RetrievalConfig, VectorConfig};
use docrag_core::query::{Intent, QueryAnalysis};
use docrag_core::types::{BoostKind, Candidate, Chunk, ContentType};

#[derive(Debug, Clone)]
pub struct Reranker {
    boosts: BoostConfig,
    vector: VectorConfig,
    threshold: f32,
}

impl Reranker {
    /// `threshold` is the resolved admission gate; `vector.similarity_threshold` is not consulted.
    pub fn new(boosts: BoostConfig, vector: VectorConfig, threshold: f32) -> Self { Self { boosts, vector, threshold } }

    pub fn from_config(cfg: &RetrievalConfig) -> Self {
        Self::new(cfg.boosts.clone(), cfg.vector.clone(), cfg.similarity_threshold())
    }

    pub fn threshold(&self) -> f32 { self.threshold }

    pub fn overfetch_factor(&self) -> usize { self.vector.overfetch_factor.max(1) }

    pub fn rerank(&self, hits: Vec<(Arc<Chunk>, f32)>, analysis: &QueryAnalysis) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = hits
            .into_iter()
            .filter(|(_, sim)| *sim >= self.threshold)
            .map(|(chunk, sim)| {
                let boosts = self.boosts_for(&chunk, analysis);
                let adjusted = sim + boosts.iter().map(|(_, b)| b).sum::<f32>();
                Candidate::from_vector(chunk, adjusted.clamp(0.0, 1.0), sim, boosts)
            })
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk.id.cmp(&b.chunk.id)));
        out
    }

    fn boosts_for(&self, chunk: &Chunk, analysis: &QueryAnalysis) -> Vec<(BoostKind, f32)> {
        let b = &self.boosts;
        let mut out = Vec::new();

        let intent = match (analysis.intent, chunk.content_type) {
            (Intent::Example, ContentType::Example) | (Intent::ApiReference, ContentType::ApiReference) => b.intent,
            (Intent::HowTo, ContentType::Tutorial | ContentType::Guide) => b.how_to,
            (Intent::CodeGeneration, _) if chunk.has_code_examples => b.code_generation,
            _ => 0.0,
        };
        if intent > 0.0 {
            out.push((BoostKind::Intent, intent));
        }

        if analysis.is_code_query && chunk.is_code && b.code > 0.0 {
            out.push((BoostKind::Code, b.code));
        }

        if !analysis.keywords.is_empty() && b.keyword_cap > 0.0 {
            let text = chunk.text.to_lowercase();
            let matched = analysis.keywords.iter().filter(|k| text.contains(k.as_str())).count();
            if matched > 0 {
                let frac = matched as f32 / analysis.keywords.len() as f32;
                out.push((BoostKind::Keyword, b.keyword_cap * frac));
            }
        }

        if chunk.difficulty == analysis.difficulty && b.difficulty > 0.0 {
            out.push((BoostKind::Difficulty, b.difficulty));
        }

        if chunk.token_count < self.vector.min_informative_tokens && b.short_penalty > 0.0 {
            out.push((BoostKind::ShortPenalty, -b.short_penalty));
        }
        out
    }
}
