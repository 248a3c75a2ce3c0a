//! Domain types shared by the chunker, the search engines and the selector.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub type ChunkId = String;
pub type DocId = String;
/// A set of document ids restricting a search. Ordered for deterministic iteration.
pub type DocSet = BTreeSet<DocId>;

/// A header marker as reported by the crawler, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMarker {
    pub level: u8,
    pub text: String,
}

/// A crawled page. Immutable once crawled.
///
/// Crawler output uses `content`/`headers`; both spellings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default, alias = "headers")]
    pub sections: Vec<SectionMarker>,
    #[serde(default)]
    pub code_blocks: Vec<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), url: url.into(), title: title.into(), text: text.into(), sections: Vec::new(), code_blocks: Vec::new() }
    }

    #[must_use]
    pub fn with_section(mut self, level: u8, text: impl Into<String>) -> Self {
        self.sections.push(SectionMarker { level, text: text.into() });
        self
    }

    #[must_use]
    pub fn with_code_block(mut self, code: impl Into<String>) -> Self {
        self.code_blocks.push(code.into());
        self
    }

    /// Slash-joined path segments of the source URL (no scheme, host, query or fragment).
    pub fn path(&self) -> String {
        url_path_segments(&self.url).join("/")
    }
}

/// Split a URL or plain path into its path segments.
///
/// `https://host/a/b/c.html?x#y` -> `["a", "b", "c.html"]`. A URL without a
/// path yields the host as its only segment so every document has a leaf.
pub fn url_path_segments(url: &str) -> Vec<String> {
    let without_fragment = url.split(['#', '?']).next().unwrap_or_default();
    let (host, path) = match without_fragment.split_once("://") {
        Some((_, rest)) => match rest.split_once('/') {
            Some((host, path)) => (host, path),
            None => (rest, ""),
        },
        None => ("", without_fragment),
    };
    let segments: Vec<String> = path.split('/').filter(|p| !p.is_empty()).map(str::to_string).collect();
    if segments.is_empty() && !host.is_empty() {
        return vec![host.to_string()];
    }
    segments
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Documentation,
    Example,
    ApiReference,
    Tutorial,
    Guide,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Documentation => "documentation",
            ContentType::Example => "example",
            ContentType::ApiReference => "api_reference",
            ContentType::Tutorial => "tutorial",
            ContentType::Guide => "guide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "documentation" => ContentType::Documentation,
            "example" => ContentType::Example,
            "api_reference" => ContentType::ApiReference,
            "tutorial" => ContentType::Tutorial,
            "guide" => ContentType::Guide,
            _ => return None,
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    IntermediateAdvanced,
    Advanced,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::IntermediateAdvanced => "intermediate_advanced",
            Difficulty::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "beginner" => Difficulty::Beginner,
            "intermediate" => Difficulty::Intermediate,
            "intermediate_advanced" => Difficulty::IntermediateAdvanced,
            "advanced" => Difficulty::Advanced,
            _ => return None,
        })
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A contiguous span of a document, the atomic retrievable unit.
///
/// - `id`: `"{doc_id}:{seq}"`, stable for identical input and parameters
/// - `doc_path`: path derived from the source URL, used for deterministic tie-breaks
/// - `overlap_len`: byte length of the leading text shared with the previous chunk
///   (zero for the first chunk of a section)
/// - `content_type`/`difficulty`/`has_code_examples`: inherited from the document profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: DocId,
    pub doc_path: String,
    pub source_url: String,
    pub doc_title: String,
    pub seq: usize,
    pub section_title: Option<String>,
    pub section_level: Option<u8>,
    pub is_code: bool,
    pub token_count: usize,
    pub overlap_len: usize,
    pub text: String,
    pub content_type: ContentType,
    pub difficulty: Difficulty,
    pub has_code_examples: bool,
}

impl Chunk {
    pub fn chunk_id(doc_id: &str, seq: usize) -> ChunkId { format!("{}:{}", doc_id, seq) }

    /// The text this chunk adds on top of its predecessor.
    pub fn fresh_text(&self) -> &str { self.text.get(self.overlap_len..).unwrap_or_default() }
}

/// Which engine produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Vector,
    Text,
}

/// Additive adjustments the re-ranker applied on top of raw similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BoostKind {
    Intent,
    Code,
    Keyword,
    Difficulty,
    ShortPenalty,
}

/// Where a candidate's score came from.
///
/// `text_score` and `vector_score` are both normalised to `[0, 1]`;
/// `similarity` keeps the raw cosine for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub text_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub similarity: Option<f32>,
    pub boosts: Vec<(BoostKind, f32)>,
}

impl Provenance {
    pub fn sources(&self) -> Vec<SourceKind> {
        let mut out = Vec::new();
        if self.vector_score.is_some() { out.push(SourceKind::Vector); }
        if self.text_score.is_some() { out.push(SourceKind::Text); }
        out
    }

    pub fn has(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Vector => self.vector_score.is_some(),
            SourceKind::Text => self.text_score.is_some(),
        }
    }

    /// Fold another engine's provenance for the same chunk into this one.
    pub fn merge(&mut self, other: &Provenance) {
        if other.text_score.is_some() { self.text_score = max_opt(self.text_score, other.text_score); }
        if other.vector_score.is_some() {
            self.vector_score = max_opt(self.vector_score, other.vector_score);
            self.similarity = max_opt(self.similarity, other.similarity);
            if self.boosts.is_empty() { self.boosts.clone_from(&other.boosts); }
        }
    }
}

fn max_opt(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// A per-query match produced by one engine, before merging.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Arc<Chunk>,
    pub score: f32,
    pub provenance: Provenance,
}

impl Candidate {
    pub fn from_text(chunk: Arc<Chunk>, score: f32) -> Self {
        Self { chunk, score, provenance: Provenance { text_score: Some(score), ..Provenance::default() } }
    }

    pub fn from_vector(chunk: Arc<Chunk>, score: f32, similarity: f32, boosts: Vec<(BoostKind, f32)>) -> Self {
        Self { chunk, score, provenance: Provenance { vector_score: Some(score), similarity: Some(similarity), boosts, ..Provenance::default() } }
    }

    pub fn chunk_id(&self) -> &str { &self.chunk.id }
}

/// One accepted chunk of a selection.
#[derive(Debug, Clone)]
pub struct Selected {
    pub chunk: Arc<Chunk>,
    pub score: f32,
    pub provenance: Provenance,
}

/// The budget-constrained, relevance-ordered context for one query.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub entries: Vec<Selected>,
    pub total_tokens: usize,
    /// Chunks larger than the whole token budget; never truncated.
    pub oversized: Vec<ChunkId>,
}

impl SelectionResult {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn chunk_ids(&self) -> Vec<&str> { self.entries.iter().map(|e| e.chunk.id.as_str()).collect() }

    /// Numbered context sections for the answer generator.
    pub fn format_context(&self) -> String {
        if self.entries.is_empty() {
            return "No relevant documentation found.".to_string();
        }
        let rule = "=".repeat(50);
        let parts: Vec<String> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let c = &e.chunk;
                let title = c.section_title.as_deref().filter(|t| !t.is_empty()).unwrap_or(if c.doc_title.is_empty() { "Documentation" } else { c.doc_title.as_str() });
                let mut part = format!("## Context {}: {}", i + 1, title);
                if c.content_type != ContentType::Documentation {
                    part.push_str(&format!(" ({})", c.content_type));
                }
                part.push_str(&format!("\n\n{}\n", c.text));
                if !c.source_url.is_empty() {
                    part.push_str(&format!("\n*Source: {}*\n", c.source_url));
                }
                part
            })
            .collect();
        format!("\n{}{}\n{}", rule, parts.join("\n"), rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_segments_strip_scheme_host_and_query() {
        assert_eq!(url_path_segments("https://nvidia.github.io/cuda-quantum/latest/api/python.html?x=1#top"), vec!["cuda-quantum", "latest", "api", "python.html"]);
        assert_eq!(url_path_segments("https://example.org"), vec!["example.org"]);
        assert_eq!(url_path_segments("api/kernels/index.md"), vec!["api", "kernels", "index.md"]);
        assert!(url_path_segments("").is_empty());
    }

    #[test]
    fn provenance_merge_keeps_both_sources_and_max_scores() {
        let mut a = Provenance { text_score: Some(0.4), ..Provenance::default() };
        let b = Provenance { vector_score: Some(0.7), similarity: Some(0.6), boosts: vec![(BoostKind::Code, 0.1)], ..Provenance::default() };
        a.merge(&b);
        assert_eq!(a.sources(), vec![SourceKind::Vector, SourceKind::Text]);
        assert_eq!(a.vector_score, Some(0.7));
        a.merge(&Provenance { text_score: Some(0.2), ..Provenance::default() });
        assert_eq!(a.text_score, Some(0.4));
    }

    #[test]
    fn document_deserializes_crawler_field_names() {
        let json = r#"{"id":"d1","url":"https://h/a/b.html","title":"B","content":"Hello","headers":[{"level":1,"text":"Hello"}]}"#;
        let doc: Document = serde_json::from_str(json).expect("parse");
        assert_eq!(doc.text, "Hello");
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.code_blocks.is_empty());
        assert_eq!(doc.path(), "a/b.html");
    }

    #[test]
    fn context_lists_sections_with_type_and_source() {
        assert_eq!(SelectionResult::default().format_context(), "No relevant documentation found.");
        let doc = Document::new("d", "https://h/examples/bell.html", "Bell", "Prepare a Bell pair.").with_section(1, "Prepare a Bell pair.");
        let mut chunk = crate::chunker::segment(&doc, 64, 0).remove(0);
        chunk.content_type = ContentType::Example;
        let sel = SelectionResult {
            entries: vec![Selected { chunk: Arc::new(chunk), score: 0.9, provenance: Provenance::default() }],
            total_tokens: 4,
            oversized: Vec::new(),
        };
        let text = sel.format_context();
        assert!(text.contains("## Context 1: Prepare a Bell pair. (example)"));
        assert!(text.contains("*Source: https://h/examples/bell.html*"));
    }
}
