//! docrag-text
//!
//! Keyword side of retrieval: a tantivy analyzer for tokenization, an
//! in-memory BM25 index over chunks, and literal/regex grep with snippets.
pub mod analyzer;
pub mod bm25;
pub mod grep;

pub use analyzer::Analyzer;
pub use bm25::KeywordIndex;
pub use grep::{GrepMatch, GrepOptions};
