use std::sync::Arc;

use docrag_core::chunker::Chunker;
use docrag_core::config::{ChunkingConfig, KeywordConfig};
use docrag_core::error::Error;
use docrag_core::types::{Chunk, DocSet, Document};
use docrag_text::{GrepOptions, KeywordIndex};
use proptest::prelude::*;

fn corpus() -> Vec<Document> {
	vec![
		Document::new("sample", "https://docs/api/sample.html", "Sampling", "Use cudaq.sample(kernel, shots_count=100) to collect counts from a kernel."),
		Document::new("observe", "https://docs/api/observe.html", "Observe", "cudaq observe computes expectation values. Sample sample sample the cudaq kernel many times."),
		Document::new("install", "https://docs/guides/install.html", "Install", "# Installing\nInstall with pip.\n# Docker\nPull the container image.")
			.with_section(1, "Installing")
			.with_section(1, "Docker"),
		Document::new("kernels", "https://docs/examples/kernels.html", "Kernels", "```python\n@cudaq.kernel\ndef bell():\n    q = cudaq.qvector(2)\n```\n"),
	]
}

fn chunks(docs: &[Document]) -> Vec<Arc<Chunk>> {
	let chunker = Chunker::new(&ChunkingConfig::default());
	docs.iter().flat_map(|d| chunker.segment(d)).map(Arc::new).collect()
}

fn index() -> KeywordIndex {
	KeywordIndex::build(chunks(&corpus()), &KeywordConfig::default()).expect("index")
}

fn scope(ids: &[&str]) -> DocSet {
	ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn exact_dotted_term_ranks_its_chunk_first() {
	let idx = index();
	let hits = idx.bm25_search("cudaq.sample", None, 10);
	assert_eq!(hits.len(), 1, "only one chunk holds the literal term: {hits:?}");
	assert_eq!(hits[0].0, "sample:0");
}

#[test]
fn dotted_parts_are_still_searchable() {
	let idx = index();
	let hits = idx.bm25_search("sample", None, 10);
	let ids: Vec<_> = hits.iter().map(|h| h.0.as_str()).collect();
	assert!(ids.contains(&"sample:0"));
	assert_eq!(ids[0], "observe:0", "higher term frequency wins: {ids:?}");
	assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn scope_excludes_other_documents() {
	let idx = index();
	let hits = idx.bm25_search("cudaq kernel", Some(&scope(&["observe", "kernels"])), 10);
	assert!(!hits.is_empty());
	assert!(hits.iter().all(|(id, _)| id.starts_with("observe:") || id.starts_with("kernels:")));
	assert!(idx.bm25_search("cudaq", Some(&scope(&["missing"])), 10).is_empty());
}

#[test]
fn empty_query_and_zero_k_are_empty() {
	let idx = index();
	assert!(idx.bm25_search("", None, 10).is_empty());
	assert!(idx.bm25_search("the and of", None, 10).is_empty());
	assert!(idx.bm25_search("cudaq", None, 0).is_empty());
}

#[test]
fn empty_corpus_searches_cleanly() {
	let idx = KeywordIndex::build(Vec::new(), &KeywordConfig::default()).unwrap();
	assert!(idx.is_empty());
	assert!(idx.bm25_search("cudaq", None, 5).is_empty());
	assert!(idx.grep("cudaq", None, GrepOptions::default()).unwrap().is_empty());
}

#[test]
fn candidates_are_normalised_below_one() {
	let idx = index();
	let cands = idx.search_candidates("cudaq kernel", None, 10);
	assert!(!cands.is_empty());
	for c in &cands {
		assert!(c.score > 0.0 && c.score < 1.0);
		assert_eq!(c.provenance.text_score, Some(c.score));
	}
}

#[test]
fn grep_literal_is_case_insensitive_by_default() {
	let idx = index();
	let hits = idx.grep("CUDAQ.SAMPLE", None, GrepOptions::default()).unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk_id, "sample:0");
	assert_eq!(hits[0].offset, 4);
	assert!(hits[0].snippet.contains("cudaq.sample(kernel"));

	let strict = idx.grep("CUDAQ.SAMPLE", None, GrepOptions { case_sensitive: true, is_regex: false }).unwrap();
	assert!(strict.is_empty());
}

#[test]
fn grep_literal_escapes_regex_metacharacters() {
	let idx = index();
	let hits = idx.grep("qvector(2)", None, GrepOptions::default()).unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].doc_id, "kernels");
}

#[test]
fn grep_regex_respects_scope_and_rejects_bad_patterns() {
	let idx = index();
	let hits = idx.grep(r"cudaq\.\w+", Some(&scope(&["kernels"])), GrepOptions { case_sensitive: false, is_regex: true }).unwrap();
	let matched: Vec<_> = hits.iter().map(|h| h.matched.as_str()).collect();
	assert_eq!(matched, vec!["cudaq.kernel", "cudaq.qvector"]);

	let err = idx.grep("(unclosed", None, GrepOptions { case_sensitive: false, is_regex: true }).unwrap_err();
	assert!(matches!(err, Error::InvalidPattern(_)));
	assert!(idx.grep("", None, GrepOptions::default()).unwrap().is_empty());
}

#[test]
fn grep_caps_matches_per_chunk() {
	let cfg = KeywordConfig { max_matches_per_chunk: 2, ..KeywordConfig::default() };
	let idx = KeywordIndex::build(chunks(&corpus()), &cfg).unwrap();
	let hits = idx.grep("sample", Some(&scope(&["observe"])), GrepOptions::default()).unwrap();
	assert_eq!(hits.len(), 2);
}

#[test]
fn code_examples_and_headers() {
	let idx = index();
	let code = idx.find_code_examples("qvector", None);
	assert_eq!(code.len(), 1);
	assert_eq!(code[0].doc_id, "kernels");

	let headers = idx.search_headers("docker", None);
	assert_eq!(headers.len(), 1);
	assert_eq!(headers[0].section_title.as_deref(), Some("Docker"));
	assert!(idx.search_headers("docker", Some(&scope(&["sample"]))).is_empty());
}

proptest! {
	#[test]
	fn bm25_is_deterministic(query in "[a-z. ]{0,24}") {
		let idx = index();
		prop_assert_eq!(idx.bm25_search(&query, None, 10), idx.bm25_search(&query, None, 10));
	}
}
