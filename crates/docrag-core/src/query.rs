//! Query analysis: intent, keywords, code-seeking flag and difficulty.

use crate::types::Difficulty;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    HowTo,
    WhatIs,
    Example,
    Troubleshoot,
    Comparison,
    ApiReference,
    BestPractice,
    CodeGeneration,
    General,
}

// Checked in order; the first intent with a matching pattern wins.
const INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (Intent::HowTo, &["how to", "how do i", "how can i", "steps to", "tutorial"]),
    (Intent::WhatIs, &["what is", "what are", "define", "explain", "meaning of"]),
    (Intent::Example, &["example", "sample", "demo", "show me"]),
    (Intent::Troubleshoot, &["error", "problem", "issue", "not working", "debug", "fix"]),
    (Intent::Comparison, &["vs", "versus", "compare", "difference", "better"]),
    (Intent::ApiReference, &["function", "method", "class", "parameter", "api", "reference"]),
    (Intent::BestPractice, &["best practice", "recommended", "should i", "better way"]),
    (Intent::CodeGeneration, &["write code", "generate", "create", "implement", "build"]),
];

const CODE_INDICATORS: &[&str] =
    &["code", "example", "implement", "write", "create", "build", "function", "class", "method", "syntax", "snippet"];
const BEGINNER_TERMS: &[&str] = &["basic", "simple", "introduction", "getting started", "beginner"];
const ADVANCED_TERMS: &[&str] = &["advanced", "complex", "optimization", "performance", "internals"];
const STOP_WORDS: &[&str] = &[
    "how", "to", "do", "i", "can", "what", "is", "are", "the", "a", "an", "and", "or", "but", "in", "on", "at", "for",
    "with", "by", "from", "of", "as", "this", "that",
];

/// What the caller is looking for, derived from the raw query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub intent: Intent,
    /// Lowercased alphabetic words longer than two characters, stop words removed.
    pub keywords: Vec<String>,
    pub is_code_query: bool,
    pub difficulty: Difficulty,
}

impl QueryAnalysis {
    pub fn analyze(query: &str) -> Self {
        let lower = query.to_lowercase();
        let intent = INTENT_PATTERNS
            .iter()
            .find(|(_, pats)| pats.iter().any(|p| lower.contains(p)))
            .map_or(Intent::General, |(intent, _)| *intent);
        let keywords = lower
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect();
        let is_code_query = CODE_INDICATORS.iter().any(|p| lower.contains(p));
        let difficulty = if BEGINNER_TERMS.iter().any(|t| lower.contains(t)) {
            Difficulty::Beginner
        } else if ADVANCED_TERMS.iter().any(|t| lower.contains(t)) {
            Difficulty::Advanced
        } else {
            Difficulty::Intermediate
        };
        Self { original_query: query.to_string(), intent, keywords, is_code_query, difficulty }
    }

    pub fn is_empty(&self) -> bool { self.original_query.trim().is_empty() }
}
