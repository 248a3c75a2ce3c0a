use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use docrag_core::config::KeywordConfig;
use docrag_core::error::Result;
use docrag_core::types::{Candidate, Chunk, ChunkId, DocSet};
use rayon::prelude::*;
use tracing::debug;

use crate::analyzer::Analyzer;

struct ChunkTerms {
	tf: HashMap<String, u32>,
	len: usize,
}

/// In-memory BM25 index over chunk text.
///
/// Term statistics are computed once at build time. Queries restricted to a
/// document subset recompute document frequency and average length over
/// that subset only, so scores depend on nothing outside the scope.
pub struct KeywordIndex {
	chunks: Vec<Arc<Chunk>>,
	terms: Vec<ChunkTerms>,
	doc_freq: HashMap<String, usize>,
	avg_len: f32,
	by_doc: HashMap<String, Vec<usize>>,
	by_id: HashMap<ChunkId, usize>,
	analyzer: Analyzer,
	cfg: KeywordConfig,
}

impl KeywordIndex {
	pub fn build(chunks: Vec<Arc<Chunk>>, cfg: &KeywordConfig) -> Result<Self> {
		let analyzer = Analyzer::new()?;
		let mut chunks = chunks;
		chunks.sort_by(|a, b| (&a.doc_path, &a.doc_id, a.seq).cmp(&(&b.doc_path, &b.doc_id, b.seq)));

		let terms: Vec<ChunkTerms> = chunks
			.par_iter()
			.map(|c| {
				let words = analyzer.index_terms(&c.text);
				let mut tf = HashMap::new();
				for w in &words {
					*tf.entry(w.clone()).or_insert(0u32) += 1;
				}
				ChunkTerms { tf, len: words.len() }
			})
			.collect();

		let mut doc_freq: HashMap<String, usize> = HashMap::new();
		let mut by_doc: HashMap<String, Vec<usize>> = HashMap::new();
		let mut by_id = HashMap::with_capacity(chunks.len());
		for (i, (chunk, t)) in chunks.iter().zip(&terms).enumerate() {
			for term in t.tf.keys() {
				*doc_freq.entry(term.clone()).or_insert(0) += 1;
			}
			by_doc.entry(chunk.doc_id.clone()).or_default().push(i);
			by_id.insert(chunk.id.clone(), i);
		}
		let avg_len = mean_len(terms.iter().map(|t| t.len));
		debug!(chunks = chunks.len(), vocabulary = doc_freq.len(), avg_len, "built keyword index");

		Ok(Self { chunks, terms, doc_freq, avg_len, by_doc, by_id, analyzer, cfg: cfg.clone() })
	}

	pub fn len(&self) -> usize { self.chunks.len() }

	pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

	pub fn config(&self) -> &KeywordConfig { &self.cfg }

	pub fn analyzer(&self) -> &Analyzer { &self.analyzer }

	/// Chunks in index order (document path, then sequence).
	pub fn chunks(&self) -> &[Arc<Chunk>] { &self.chunks }

	/// Indices of chunks inside `scope`, in index order. `None` means every chunk.
	pub(crate) fn scoped(&self, scope: Option<&DocSet>) -> Vec<usize> {
		match scope {
			None => (0..self.chunks.len()).collect(),
			Some(docs) => {
				let mut idx: Vec<usize> = docs.iter().filter_map(|d| self.by_doc.get(d)).flatten().copied().collect();
				idx.sort_unstable();
				idx
			}
		}
	}

	/// Raw BM25 scores, descending, ties broken by chunk id.
	pub fn bm25_search(&self, query: &str, scope: Option<&DocSet>, top_k: usize) -> Vec<(ChunkId, f32)> {
		if top_k == 0 {
			return Vec::new();
		}
		let mut seen = HashSet::new();
		let query_terms: Vec<String> = self.analyzer.tokenize(query).into_iter().filter(|t| seen.insert(t.clone())).collect();
		if query_terms.is_empty() {
			return Vec::new();
		}

		let pool = self.scoped(scope);
		if pool.is_empty() {
			return Vec::new();
		}
		let (df, avg_len): (HashMap<&str, usize>, f32) = match scope {
			None => {
				let df = query_terms.iter().map(|t| (t.as_str(), self.doc_freq.get(t).copied().unwrap_or(0))).collect();
				(df, self.avg_len)
			}
			Some(_) => {
				let df = query_terms
					.iter()
					.map(|t| (t.as_str(), pool.iter().filter(|&&i| self.terms[i].tf.contains_key(t)).count()))
					.collect();
				(df, mean_len(pool.iter().map(|&i| self.terms[i].len)))
			}
		};

		let n = pool.len() as f32;
		let k1 = self.cfg.bm25_k1;
		let b = self.cfg.bm25_b;
		let mut hits: Vec<(ChunkId, f32)> = pool
			.iter()
			.filter_map(|&i| {
				let t = &self.terms[i];
				let mut score = 0.0f32;
				for term in &query_terms {
					let Some(&tf) = t.tf.get(term) else { continue };
					let df = df.get(term.as_str()).copied().unwrap_or(0) as f32;
					let idf = ((n - df + 0.5) / (df + 0.5)).ln_1p().max(0.0);
					let tf = tf as f32;
					let norm = b.mul_add(t.len as f32 / avg_len.max(1.0), 1.0 - b);
					score += idf * (tf * (k1 + 1.0) / k1.mul_add(norm, tf));
				}
				(score > 0.0).then(|| (self.chunks[i].id.clone(), score))
			})
			.collect();

		hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		hits.truncate(top_k);
		hits
	}

	/// BM25 hits as candidates with scores mapped into `[0, 1)`.
	pub fn search_candidates(&self, query: &str, scope: Option<&DocSet>, top_k: usize) -> Vec<Candidate> {
		self.bm25_search(query, scope, top_k)
			.into_iter()
			.filter_map(|(id, raw)| self.get(&id).map(|c| Candidate::from_text(Arc::clone(c), self.normalize(raw))))
			.collect()
	}

	pub fn normalize(&self, raw: f32) -> f32 { raw / (raw + self.cfg.saturation) }

	pub fn get(&self, chunk_id: &str) -> Option<&Arc<Chunk>> { self.by_id.get(chunk_id).map(|&i| &self.chunks[i]) }
}

fn mean_len(lens: impl Iterator<Item = usize>) -> f32 {
	let (sum, count) = lens.fold((0usize, 0usize), |(s, c), l| (s + l, c + 1));
	if count == 0 { 0.0 } else { sum as f32 / count as f32 }
}
