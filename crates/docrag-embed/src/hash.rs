use std::hash::{Hash, Hasher};

use anyhow::Result;
use docrag_core::traits::Embedder;
use twox_hash::XxHash64;

/// Deterministic feature-hashing embedder.
///
/// Each lowercased token (dotted identifiers also by their parts) lands in one
/// of `dim` buckets with a hash-derived sign; the vector is L2-normalised.
/// Texts sharing vocabulary get high cosine similarity. No model files needed.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        token.hash(&mut hasher);
        let h = hasher.finish();
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        ((h % self.dim as u64) as usize, sign)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lower = text.to_lowercase();
        for token in lower.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')) {
            let token = token.trim_matches('.');
            if token.is_empty() {
                continue;
            }
            let (i, s) = self.bucket(token);
            v[i] += s;
            if token.contains('.') {
                for part in token.split('.').filter(|p| !p.is_empty()) {
                    let (i, s) = self.bucket(part);
                    v[i] += 0.5 * s;
                }
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> String { format!("hash-xxh64:{}", self.dim) }

    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
