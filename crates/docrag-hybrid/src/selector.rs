//! Merge keyword and vector candidates and fill the token budget.

use std::collections::HashMap;

use docrag_core::types::{Candidate, SelectionResult, Selected};
use tracing::debug;

/// One pool keyed by chunk id. A chunk found by both engines keeps the higher
/// score and both provenances. Sorted best first, ties by document path then
/// sequence number.
pub fn merge(keyword: Vec<Candidate>, vector: Vec<Candidate>) -> Vec<Candidate> {
    let mut pool: HashMap<String, Candidate> = HashMap::new();
    for cand in keyword.into_iter().chain(vector) {
        match pool.get_mut(cand.chunk_id()) {
            Some(existing) => {
                existing.provenance.merge(&cand.provenance);
                existing.score = existing.score.max(cand.score);
            }
            None => {
                pool.insert(cand.chunk.id.clone(), cand);
            }
        }
    }
    let mut merged: Vec<Candidate> = pool.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.doc_path.cmp(&b.chunk.doc_path))
            .then_with(|| a.chunk.seq.cmp(&b.chunk.seq))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    merged
}

/// Greedy budgeted selection.
///
/// A candidate that would push the running total past `max_tokens` is skipped
/// and the scan continues; a chunk larger than the whole budget is recorded in
/// `oversized`. Stops at `max_chunks` accepted chunks.
pub fn select(keyword: Vec<Candidate>, vector: Vec<Candidate>, max_chunks: usize, max_tokens: usize) -> SelectionResult {
    let mut result = SelectionResult::default();
    if max_chunks == 0 {
        return result;
    }
    for cand in merge(keyword, vector) {
        let tokens = cand.chunk.token_count;
        if tokens > max_tokens {
            result.oversized.push(cand.chunk.id.clone());
            continue;
        }
        if result.total_tokens + tokens > max_tokens {
            continue;
        }
        result.total_tokens += tokens;
        result.entries.push(Selected { chunk: cand.chunk, score: cand.score, provenance: cand.provenance });
        if result.entries.len() >= max_chunks {
            break;
        }
    }
    debug!(selected = result.len(), tokens = result.total_tokens, oversized = result.oversized.len(), "selection done");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::types::{Chunk, Document, SourceKind};
    use std::sync::Arc;

    fn chunk(doc: &str, seq: usize, tokens: usize) -> Arc<Chunk> {
        let d = Document::new(doc, format!("https://h.org/{doc}.html"), doc, "word");
        let mut c = docrag_core::chunker::segment(&d, 16, 0).remove(0);
        c.seq = seq;
        c.id = Chunk::chunk_id(doc, seq);
        c.token_count = tokens;
        Arc::new(c)
    }

    #[test]
    fn budget_skips_oversized_and_keeps_scanning() {
        let a1 = chunk("a", 0, 400);
        let a2 = chunk("a", 1, 450);
        let b = chunk("b", 0, 600);
        let c = chunk("c", 0, 5100);
        let keyword = vec![
            Candidate::from_text(a1, 0.9),
            Candidate::from_text(a2, 0.6),
            Candidate::from_text(b, 0.7),
            Candidate::from_text(c, 0.95),
        ];
        let sel = select(keyword, Vec::new(), 3, 2000);
        assert_eq!(sel.chunk_ids(), vec!["a:0", "b:0", "a:1"]);
        assert_eq!(sel.total_tokens, 1450);
        assert_eq!(sel.oversized, vec!["c:0".to_string()]);
    }

    #[test]
    fn a_chunk_that_does_not_fit_is_skipped_not_final() {
        let keyword = vec![
            Candidate::from_text(chunk("a", 0, 700), 0.9),
            Candidate::from_text(chunk("b", 0, 500), 0.8),
            Candidate::from_text(chunk("c", 0, 300), 0.7),
        ];
        let sel = select(keyword, Vec::new(), 5, 1000);
        assert_eq!(sel.chunk_ids(), vec!["a:0", "c:0"]);
        assert!(sel.oversized.is_empty());
    }

    #[test]
    fn both_engines_take_max_not_sum() {
        let c = chunk("a", 0, 10);
        let keyword = vec![Candidate::from_text(Arc::clone(&c), 0.4)];
        let vector = vec![Candidate::from_vector(c, 0.7, 0.65, Vec::new())];
        let sel = select(keyword, vector, 10, 100);
        assert_eq!(sel.len(), 1);
        assert!((sel.entries[0].score - 0.7).abs() < 1e-6);
        assert_eq!(sel.entries[0].provenance.sources(), vec![SourceKind::Vector, SourceKind::Text]);
    }

    #[test]
    fn ties_order_by_path_then_sequence() {
        let keyword = vec![
            Candidate::from_text(chunk("b", 0, 1), 0.5),
            Candidate::from_text(chunk("a", 1, 1), 0.5),
            Candidate::from_text(chunk("a", 0, 1), 0.5),
        ];
        let sel = select(keyword, Vec::new(), 10, 100);
        assert_eq!(sel.chunk_ids(), vec!["a:0", "a:1", "b:0"]);
    }

    #[test]
    fn zero_limits_select_nothing() {
        let keyword = vec![Candidate::from_text(chunk("a", 0, 1), 0.5)];
        assert!(select(keyword.clone(), Vec::new(), 0, 100).is_empty());
        assert!(select(keyword, Vec::new(), 3, 0).is_empty());
    }
}
