use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::types::{Chunk, ChunkId, DocSet};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::bm25::KeywordIndex;

#[derive(Debug, Clone, Copy, Default)]
pub struct GrepOptions {
	pub case_sensitive: bool,
	pub is_regex: bool,
}

/// One literal or regex hit inside a chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrepMatch {
	pub chunk_id: ChunkId,
	pub doc_id: String,
	/// Byte offset of the match within the chunk text.
	pub offset: usize,
	pub matched: String,
	pub snippet: String,
}

fn compile(pattern: &str, opts: GrepOptions) -> Result<Regex> {
	let source = if opts.is_regex { pattern.to_string() } else { regex::escape(pattern) };
	RegexBuilder::new(&source)
		.case_insensitive(!opts.case_sensitive)
		.build()
		.map_err(|e| Error::InvalidPattern(e.to_string()))
}

impl KeywordIndex {
	/// Literal or regex matches in chunk text, in index order.
	///
	/// An empty pattern or no match is an empty result. A malformed regex is
	/// `InvalidPattern`.
	pub fn grep(&self, pattern: &str, scope: Option<&DocSet>, opts: GrepOptions) -> Result<Vec<GrepMatch>> {
		if pattern.is_empty() {
			return Ok(Vec::new());
		}
		let re = compile(pattern, opts)?;
		let cfg = self.config();
		let mut out = Vec::new();
		for i in self.scoped(scope) {
			let chunk = &self.chunks()[i];
			for m in re.find_iter(&chunk.text).filter(|m| !m.is_empty()).take(cfg.max_matches_per_chunk) {
				out.push(GrepMatch {
					chunk_id: chunk.id.clone(),
					doc_id: chunk.doc_id.clone(),
					offset: m.start(),
					matched: m.as_str().to_string(),
					snippet: snippet(&chunk.text, m.start(), m.end(), cfg.snippet_chars),
				});
				if out.len() >= cfg.max_total_matches {
					return Ok(out);
				}
			}
		}
		Ok(out)
	}

	/// Code chunks that mention `keyword` (case-insensitive).
	pub fn find_code_examples(&self, keyword: &str, scope: Option<&DocSet>) -> Vec<Arc<Chunk>> {
		let needle = keyword.to_lowercase();
		if needle.trim().is_empty() {
			return Vec::new();
		}
		self.scoped(scope)
			.into_iter()
			.map(|i| &self.chunks()[i])
			.filter(|c| c.is_code && c.text.to_lowercase().contains(&needle))
			.cloned()
			.collect()
	}

	/// Chunks whose section title contains `keyword` (case-insensitive).
	pub fn search_headers(&self, keyword: &str, scope: Option<&DocSet>) -> Vec<Arc<Chunk>> {
		let needle = keyword.to_lowercase();
		if needle.trim().is_empty() {
			return Vec::new();
		}
		self.scoped(scope)
			.into_iter()
			.map(|i| &self.chunks()[i])
			.filter(|c| c.section_title.as_ref().is_some_and(|t| t.to_lowercase().contains(&needle)))
			.cloned()
			.collect()
	}
}

/// About `width` characters centred on the match, on one line.
fn snippet(text: &str, start: usize, end: usize, width: usize) -> String {
	let match_chars = text[start..end].chars().count();
	let side = width.saturating_sub(match_chars) / 2;
	let from = text[..start].char_indices().rev().take(side).last().map_or(start, |(i, _)| i);
	let to = text[end..].char_indices().nth(side).map_or(text.len(), |(i, _)| end + i);
	let mut s = String::new();
	if from > 0 {
		s.push_str("...");
	}
	s.push_str(&text[from..to].split_whitespace().collect::<Vec<_>>().join(" "));
	if to < text.len() {
		s.push_str("...");
	}
	s
}
