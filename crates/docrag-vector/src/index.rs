//! Exact cosine nearest-neighbour search over an immutable set of chunk vectors.

use std::collections::HashMap;
use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::query::QueryAnalysis;
use docrag_core::traits::Embedder;
use docrag_core::types::{Candidate, Chunk, ChunkId, DocSet};
use rayon::prelude::*;
use tracing::debug;

use crate::rerank::Reranker;

pub struct VectorIndex {
    chunks: Vec<Arc<Chunk>>,
    /// L2-normalised, parallel to `chunks`.
    vectors: Vec<Vec<f32>>,
    by_id: HashMap<ChunkId, usize>,
    dim: usize,
    embedder_id: String,
}

impl VectorIndex {
    pub fn build(chunks: Vec<Arc<Chunk>>, vectors: Vec<Vec<f32>>, embedder_id: impl Into<String>, dim: usize) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(Error::CorruptArtifact(format!("{} chunks but {} vectors", chunks.len(), vectors.len())));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::EmbeddingMismatch { expected: dim, found: bad.len() });
        }
        let vectors: Vec<Vec<f32>> = vectors.into_par_iter().map(normalized).collect();
        let by_id = chunks.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        debug!(chunks = chunks.len(), dim, "vector index built");
        Ok(Self { chunks, vectors, by_id, dim, embedder_id: embedder_id.into() })
    }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn dim(&self) -> usize { self.dim }

    pub fn embedder_id(&self) -> &str { &self.embedder_id }

    pub fn chunks(&self) -> &[Arc<Chunk>] { &self.chunks }

    /// Normalised vectors, parallel to [`VectorIndex::chunks`].
    pub fn vectors(&self) -> &[Vec<f32>] { &self.vectors }

    pub fn get(&self, id: &str) -> Option<&Arc<Chunk>> { self.by_id.get(id).map(|&i| &self.chunks[i]) }

    /// Refuse to compare against vectors produced by another embedder.
    pub fn check_embedder(&self, embedder: &dyn Embedder) -> Result<()> {
        if embedder.dim() != self.dim {
            return Err(Error::EmbeddingMismatch { expected: embedder.dim(), found: self.dim });
        }
        Ok(())
    }

    /// Cosine similarity of every in-scope chunk, best first, ties by chunk id.
    pub fn similarity_search(&self, query: &[f32], scope: Option<&DocSet>, top_k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if query.len() != self.dim {
            return Err(Error::EmbeddingMismatch { expected: query.len(), found: self.dim });
        }
        if top_k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let q = normalized(query.to_vec());
        let mut hits: Vec<(usize, f32)> = self
            .chunks
            .par_iter()
            .enumerate()
            .filter(|(_, c)| scope.map_or(true, |s| s.contains(&c.doc_id)))
            .map(|(i, _)| (i, dot(&q, &self.vectors[i])))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| self.chunks[a.0].id.cmp(&self.chunks[b.0].id)));
        hits.truncate(top_k);
        Ok(hits.into_iter().map(|(i, s)| (self.chunks[i].id.clone(), s)).collect())
    }

    /// Over-fetch, re-rank and keep the best `top_k` admitted candidates.
    pub fn search(
        &self,
        query: &[f32],
        analysis: &QueryAnalysis,
        scope: Option<&DocSet>,
        top_k: usize,
        reranker: &Reranker,
    ) -> Result<Vec<Candidate>> {
        let pool = self.similarity_search(query, scope, top_k.saturating_mul(reranker.overfetch_factor()))?;
        let hits = pool.into_iter().filter_map(|(id, s)| self.get(&id).map(|c| (Arc::clone(c), s))).collect::<Vec<_>>();
        let mut ranked = reranker.rerank(hits, analysis);
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::types::Document;

    fn chunk(doc: &str, seq: usize) -> Arc<Chunk> {
        let d = Document::new(doc, format!("https://x.org/{doc}"), doc, "text");
        let mut c = docrag_core::chunker::segment(&d, 16, 0).remove(0);
        c.seq = seq;
        c.id = Chunk::chunk_id(doc, seq);
        Arc::new(c)
    }

    fn index() -> VectorIndex {
        let chunks = vec![chunk("a", 0), chunk("b", 0), chunk("c", 0)];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0]];
        VectorIndex::build(chunks, vectors, "test:2", 2).unwrap()
    }

    #[test]
    fn nearest_first() {
        let hits = index().similarity_search(&[1.0, 0.0], None, 3).unwrap();
        assert_eq!(hits[0].0, "a:0");
        assert_eq!(hits[1].0, "c:0");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert!(hits[2].1.abs() < 1e-6);
    }

    #[test]
    fn scope_filters_documents() {
        let scope: DocSet = ["b".to_string()].into_iter().collect();
        let hits = index().similarity_search(&[1.0, 0.0], Some(&scope), 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b:0");
    }

    #[test]
    fn equal_scores_order_by_id() {
        let chunks = vec![chunk("z", 0), chunk("m", 0)];
        let idx = VectorIndex::build(chunks, vec![vec![1.0, 0.0], vec![2.0, 0.0]], "t", 2).unwrap();
        let hits = idx.similarity_search(&[1.0, 0.0], None, 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.0.as_str()).collect::<Vec<_>>(), vec!["m:0", "z:0"]);
    }

    #[test]
    fn wrong_query_dimension_is_a_mismatch() {
        let err = index().similarity_search(&[1.0, 0.0, 0.0], None, 3).unwrap_err();
        assert!(matches!(err, Error::EmbeddingMismatch { expected: 3, found: 2 }));
    }

    #[test]
    fn build_rejects_mixed_widths() {
        let err = VectorIndex::build(vec![chunk("a", 0)], vec![vec![1.0]], "t", 2).err().unwrap();
        assert!(err.requires_rebuild());
    }
}
