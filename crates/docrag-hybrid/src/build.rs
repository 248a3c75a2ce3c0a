//! One-shot index construction from documents.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use docrag_core::config::RetrievalConfig;
use docrag_core::traits::{Embedder, Summarizer};
use docrag_core::types::{Chunk, Document};
use docrag_core::Chunker;
use docrag_hierarchy::{HierarchyTree, Overview, SummaryStore};
use docrag_text::KeywordIndex;
use docrag_vector::VectorIndex;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::snapshot::RetrievalIndex;

/// Inputs carried over from a previous build.
#[derive(Default)]
pub struct BuildOptions<'a> {
    /// Regenerate every summary even when one exists.
    pub force: bool,
    pub previous_summaries: Option<&'a SummaryStore>,
    pub previous_overview: Option<Overview>,
    /// Advanced once per embedded chunk.
    pub progress: Option<&'a ProgressBar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub summaries_reused: usize,
    pub overview_rebuilt: bool,
}

/// Chunk, index, embed and summarise `documents`.
///
/// Documents sharing an id collapse to the last one. The vector index is
/// skipped when embeddings are disabled or no embedder is given, the keyword
/// index when keyword search is disabled.
pub fn build_index(
    documents: &[Document],
    cfg: &RetrievalConfig,
    embedder: Option<&dyn Embedder>,
    summarizer: &dyn Summarizer,
    opts: BuildOptions<'_>,
) -> Result<(RetrievalIndex, BuildReport)> {
    cfg.validate()?;
    let start = Instant::now();
    let documents: Vec<Document> = documents
        .iter()
        .map(|d| (d.id.clone(), d.clone()))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect();

    let chunker = Chunker::new(&cfg.chunking);
    let chunks: Vec<Arc<Chunk>> = documents
        .par_iter()
        .map(|d| chunker.segment(d))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .map(Arc::new)
        .collect();
    info!(documents = documents.len(), chunks = chunks.len(), "documents chunked");

    let keyword = if cfg.keyword.enabled { Some(KeywordIndex::build(chunks.clone(), &cfg.keyword)?) } else { None };

    let mut embedded = 0;
    let vector = match embedder {
        Some(embedder) if cfg.embedding.enabled => {
            let vectors = embed_chunks(&chunks, embedder, cfg.embedding.batch_size, opts.progress)?;
            embedded = vectors.len();
            Some(VectorIndex::build(chunks.clone(), vectors, embedder.embedder_id(), embedder.dim())?)
        }
        Some(_) => None,
        None => {
            if cfg.embedding.enabled {
                warn!("no embedder available; building without vector search");
            }
            None
        }
    };

    let tree = HierarchyTree::build(&documents);
    let (summaries, summaries_reused) = SummaryStore::generate(
        &documents,
        summarizer,
        cfg.hierarchy.summary_words,
        opts.previous_summaries,
        opts.force,
    )?;
    let (overview, overview_rebuilt) =
        Overview::refresh(opts.previous_overview, summarizer, &summaries, cfg.hierarchy.overview_words)?;

    let report = BuildReport {
        documents: documents.len(),
        chunks: chunks.len(),
        embedded,
        summaries_reused,
        overview_rebuilt,
    };
    info!(?report, ms = start.elapsed().as_millis() as u64, "index built");
    let index = RetrievalIndex {
        chunks,
        document_count: documents.len(),
        keyword,
        vector,
        tree: Some(tree),
        summaries: Some(summaries),
        overview: Some(overview),
        notes: Vec::new(),
    };
    Ok((index, report))
}

fn embed_chunks(chunks: &[Arc<Chunk>], embedder: &dyn Embedder, batch_size: usize, progress: Option<&ProgressBar>) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let batches: Vec<Vec<Vec<f32>>> = texts
        .par_chunks(batch_size.max(1))
        .map(|batch| {
            let out = embedder.embed_batch(batch)?;
            if out.len() != batch.len() {
                return Err(anyhow!("embedder returned {} vectors for {} texts", out.len(), batch.len()));
            }
            if let Some(pb) = progress {
                pb.inc(batch.len() as u64);
            }
            Ok(out)
        })
        .collect::<Result<_>>()?;
    Ok(batches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_embed::HashEmbedder;
    use docrag_hierarchy::ExtractiveSummarizer;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a", "https://h.org/guide/a.html", "A", "first version"),
            Document::new("b", "https://h.org/api/b.html", "B", "kernel api ".repeat(40)),
            Document::new("a", "https://h.org/guide/a.html", "A", "second version of a"),
        ]
    }

    #[test]
    fn duplicate_ids_keep_the_last_document() {
        let cfg = RetrievalConfig::default();
        let embedder = HashEmbedder::new(32);
        let (index, report) = build_index(&docs(), &cfg, Some(&embedder), &ExtractiveSummarizer, BuildOptions::default()).unwrap();
        assert_eq!(report.documents, 2);
        let a = index.chunks.iter().find(|c| c.doc_id == "a").unwrap();
        assert!(a.text.starts_with("second"));
        assert_eq!(report.embedded, report.chunks);
        assert_eq!(index.dim(), Some(32));
    }

    #[test]
    fn disabled_engines_are_absent() {
        let mut cfg = RetrievalConfig::default();
        cfg.embedding.enabled = false;
        let (index, report) = build_index(&docs(), &cfg, None, &ExtractiveSummarizer, BuildOptions::default()).unwrap();
        assert!(index.vector.is_none());
        assert!(index.keyword.is_some());
        assert_eq!(report.embedded, 0);
    }

    #[test]
    fn summaries_and_overview_are_reused() {
        let cfg = RetrievalConfig::default();
        let (first, _) = build_index(&docs(), &cfg, None, &ExtractiveSummarizer, BuildOptions::default()).unwrap();
        let opts = BuildOptions {
            previous_summaries: first.summaries.as_ref(),
            previous_overview: first.overview.clone(),
            ..BuildOptions::default()
        };
        let (_, report) = build_index(&docs(), &cfg, None, &ExtractiveSummarizer, opts).unwrap();
        assert_eq!(report.summaries_reused, 2);
        assert!(!report.overview_rebuilt);
    }
}
