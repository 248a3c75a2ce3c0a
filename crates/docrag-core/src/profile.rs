//! Document profiling: content type, difficulty and URL-derived category.
//!
//! Chunks inherit the profile of their document so the re-ranker can match
//! it against the analysed query without re-reading the document.

use crate::types::{url_path_segments, ContentType, Difficulty, Document};
use std::collections::BTreeSet;

const CATEGORY_SEGMENTS: &[&str] = &["api", "examples", "tutorials", "guides", "reference"];
const BEGINNER_TITLE_TERMS: &[&str] = &["introduction", "getting started", "basics", "overview", "first", "simple", "basic"];
const ADVANCED_TERMS: &[&str] = &["advanced", "optimization", "performance", "internals", "architecture", "deep dive"];
const COMPLEXITY_TERMS: &[&str] = &["class", "template", "namespace", "algorithm", "complex"];
const KEYWORD_STOP_WORDS: &[&str] = &[
    "with", "from", "this", "that", "they", "them", "their", "there", "where", "when", "what", "which", "will", "would",
    "could", "should",
];
const MAX_KEYWORDS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentProfile {
    pub category: String,
    pub subcategory: String,
    pub content_type: ContentType,
    pub difficulty: Difficulty,
    pub has_code_examples: bool,
    /// Title and header words longer than three characters, sorted.
    pub keywords: Vec<String>,
}

impl Default for DocumentProfile {
    fn default() -> Self {
        Self {
            category: "general".to_string(),
            subcategory: "overview".to_string(),
            content_type: ContentType::Documentation,
            difficulty: Difficulty::Intermediate,
            has_code_examples: false,
            keywords: Vec::new(),
        }
    }
}

pub fn profile(doc: &Document) -> DocumentProfile {
    let (category, subcategory) = category_from_url(&doc.url);
    DocumentProfile {
        category,
        subcategory,
        content_type: content_type(&doc.title, &doc.url),
        difficulty: difficulty(&doc.title, &doc.text),
        has_code_examples: !doc.code_blocks.is_empty() || doc.text.contains("```"),
        keywords: keywords(doc),
    }
}

fn category_from_url(url: &str) -> (String, String) {
    let segments = url_path_segments(url);
    for (i, seg) in segments.iter().enumerate() {
        if CATEGORY_SEGMENTS.contains(&seg.as_str()) {
            let sub = segments
                .get(i + 1)
                .map(|s| s.trim_end_matches(".html").replace('_', " "))
                .unwrap_or_else(|| "overview".to_string());
            return (seg.clone(), sub);
        }
    }
    ("general".to_string(), "overview".to_string())
}

fn content_type(title: &str, url: &str) -> ContentType {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    let either = |needle: &str| title.contains(needle) || url.contains(needle);
    if either("example") {
        ContentType::Example
    } else if url.contains("api") || url.contains("reference") {
        ContentType::ApiReference
    } else if either("tutorial") {
        ContentType::Tutorial
    } else if either("guide") {
        ContentType::Guide
    } else {
        ContentType::Documentation
    }
}

fn difficulty(title: &str, text: &str) -> Difficulty {
    let title = title.to_lowercase();
    let text = text.to_lowercase();
    if BEGINNER_TITLE_TERMS.iter().any(|t| title.contains(t)) {
        return Difficulty::Beginner;
    }
    if ADVANCED_TERMS.iter().any(|t| title.contains(t) || text.contains(t)) {
        return Difficulty::Advanced;
    }
    let complexity: usize = COMPLEXITY_TERMS.iter().map(|t| text.matches(t).count()).sum();
    if complexity > 10 {
        return Difficulty::IntermediateAdvanced;
    }
    Difficulty::Intermediate
}

fn keywords(doc: &Document) -> Vec<String> {
    let mut out = BTreeSet::new();
    let sources = std::iter::once(doc.title.as_str()).chain(doc.sections.iter().map(|s| s.text.as_str()));
    for text in sources {
        for word in text.split_whitespace() {
            let w = word.trim_matches(|c: char| ".,!?()[]".contains(c)).to_lowercase();
            if w.chars().count() > 3 && !KEYWORD_STOP_WORDS.contains(&w.as_str()) {
                out.insert(w);
            }
        }
    }
    out.into_iter().take(MAX_KEYWORDS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_in_title_wins_over_api_url() {
        let doc = Document::new("d", "https://h/docs/api/kernels.html", "Kernel Example", "body");
        let p = profile(&doc);
        assert_eq!(p.content_type, ContentType::Example);
        assert_eq!(p.category, "api");
        assert_eq!(p.subcategory, "kernels");
    }

    #[test]
    fn difficulty_ladder() {
        assert_eq!(difficulty("Getting Started", "advanced stuff"), Difficulty::Beginner);
        assert_eq!(difficulty("Kernels", "performance tuning"), Difficulty::Advanced);
        assert_eq!(difficulty("Kernels", &"class ".repeat(11)), Difficulty::IntermediateAdvanced);
        assert_eq!(difficulty("Kernels", "plain"), Difficulty::Intermediate);
    }

    #[test]
    fn keywords_come_from_title_and_headers() {
        let doc = Document::new("d", "u", "Quantum Kernels (Python)", "x").with_section(2, "Which Observables");
        let p = profile(&doc);
        assert_eq!(p.keywords, vec!["kernels", "observables", "python", "quantum"]);
    }
}
