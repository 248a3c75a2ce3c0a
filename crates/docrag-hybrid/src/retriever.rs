//! Query entry point over an atomically swappable index snapshot.

use std::sync::Arc;

use docrag_core::config::RetrievalConfig;
use docrag_core::error::{Error, Result};
use docrag_core::query::QueryAnalysis;
use docrag_core::traits::Embedder;
use docrag_core::types::{Candidate, DocSet, SelectionResult};
use docrag_vector::Reranker;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::selector::select;
use crate::snapshot::RetrievalIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    KeywordOnly,
    VectorOnly,
}

/// How the searched document set was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSource {
    /// Caller-supplied path prefix, resolved against the hierarchy.
    Hint { prefix: String, documents: usize },
    /// Documents whose summaries matched the query keywords.
    Summaries { documents: usize },
    /// Summary narrowing to `narrowed` documents produced no keyword hits,
    /// so the whole corpus was searched instead.
    Widened { narrowed: usize },
    /// No narrowing.
    Corpus,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub selection: SelectionResult,
    pub mode: SearchMode,
    pub scope: ScopeSource,
    /// Sub-indexes that could not take part in this query.
    pub degraded: Vec<String>,
}

/// Serves queries from the current snapshot. Queries clone the snapshot
/// pointer and never hold the lock while searching; `install` swaps in a
/// fully built index.
pub struct Retriever {
    current: RwLock<Option<Arc<RetrievalIndex>>>,
    embedder: Option<Arc<dyn Embedder>>,
    cfg: RetrievalConfig,
    reranker: Reranker,
}

impl Retriever {
    pub fn new(cfg: RetrievalConfig, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        cfg.validate()?;
        let reranker = Reranker::from_config(&cfg);
        Ok(Self { current: RwLock::new(None), embedder, cfg, reranker })
    }

    pub fn config(&self) -> &RetrievalConfig { &self.cfg }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> { self.embedder.as_ref() }

    /// Replace the served index. Vectors from another embedder are refused.
    pub fn install(&self, index: RetrievalIndex) -> Result<()> {
        if let (Some(vector), Some(embedder)) = (&index.vector, &self.embedder) {
            vector.check_embedder(embedder.as_ref())?;
            let live = embedder.embedder_id();
            if vector.embedder_id() != live {
                return Err(Error::CorruptArtifact(format!(
                    "vectors were built by {}, queries use {}; rebuild the index",
                    vector.embedder_id(),
                    live
                )));
            }
        }
        info!(chunks = index.chunks.len(), documents = index.document_count, "index installed");
        *self.current.write() = Some(Arc::new(index));
        Ok(())
    }

    pub fn snapshot(&self) -> Option<Arc<RetrievalIndex>> { self.current.read().clone() }

    pub fn retrieve(&self, query: &str, analysis: &QueryAnalysis, scope_hint: Option<&str>) -> Result<Retrieval> {
        let index = self.snapshot().ok_or_else(|| Error::IndexNotReady("no index installed".into()))?;
        let mut degraded = index.notes.clone();

        let keyword = index.keyword.as_ref().filter(|_| self.cfg.keyword.enabled);
        let vector = match (&index.vector, &self.embedder) {
            (Some(v), Some(e)) => Some((v, e)),
            (Some(_), None) => {
                degraded.push("vector index present but no embedder configured".into());
                None
            }
            (None, _) => None,
        };
        let mode = match (keyword.is_some(), vector.is_some()) {
            (true, true) => SearchMode::Hybrid,
            (true, false) => SearchMode::KeywordOnly,
            (false, true) => SearchMode::VectorOnly,
            (false, false) => return Err(Error::IndexNotReady("neither keyword nor vector index is available".into())),
        };
        if keyword.is_none() {
            degraded.push("keyword index unavailable".into());
        }
        if vector.is_none() && index.vector.is_none() {
            degraded.push("vector index unavailable".into());
        }

        if query.trim().is_empty() {
            return Ok(Retrieval { selection: SelectionResult::default(), mode, scope: ScopeSource::Corpus, degraded });
        }

        let (scope_set, mut scope) = self.scope(&index, analysis, scope_hint, &mut degraded);
        let scope_ref = scope_set.as_ref();
        let max_chunks = self.cfg.selection.max_chunks;
        let pool = max_chunks.saturating_mul(self.cfg.vector.overfetch_factor.max(1));

        let query_vector = match vector {
            Some((_, embedder)) => {
                Some(embedder.embed(query).map_err(|e| Error::Operation(format!("embedding query: {e}")))?)
            }
            None => None,
        };
        let vector_search = |scope: Option<&DocSet>| -> Result<Vec<Candidate>> {
            match (vector, &query_vector) {
                (Some((v, _)), Some(q)) => v.search(q, analysis, scope, pool, &self.reranker),
                _ => Ok(Vec::new()),
            }
        };

        let mut keyword_hits = keyword.map(|k| k.search_candidates(query, scope_ref, pool)).unwrap_or_default();
        let mut vector_hits = vector_search(scope_ref)?;

        // Summaries only guess at relevance. When the exact terms live outside
        // the guessed documents, or nothing at all was found, search everything.
        if let ScopeSource::Summaries { documents } = scope {
            if keyword_hits.is_empty() {
                let wide = keyword.map(|k| k.search_candidates(query, None, pool)).unwrap_or_default();
                if !wide.is_empty() || vector_hits.is_empty() {
                    debug!(narrowed = documents, "summary scope missed; searching the whole corpus");
                    keyword_hits = wide;
                    vector_hits = vector_search(None)?;
                    scope = ScopeSource::Widened { narrowed: documents };
                }
            }
        }
        debug!(keyword = keyword_hits.len(), vector = vector_hits.len(), ?mode, "candidates");

        let selection = select(keyword_hits, vector_hits, max_chunks, self.cfg.selection.max_tokens);
        Ok(Retrieval { selection, mode, scope, degraded })
    }

    /// `None` means the whole corpus.
    fn scope(
        &self,
        index: &RetrievalIndex,
        analysis: &QueryAnalysis,
        hint: Option<&str>,
        degraded: &mut Vec<String>,
    ) -> (Option<DocSet>, ScopeSource) {
        if let Some(prefix) = hint {
            return match &index.tree {
                Some(tree) => {
                    let docs = tree.resolve(prefix);
                    let n = docs.len();
                    (Some(docs), ScopeSource::Hint { prefix: prefix.to_string(), documents: n })
                }
                None => {
                    warn!(prefix, "scope hint ignored: hierarchy unavailable");
                    degraded.push("hierarchy unavailable; scope hint ignored".into());
                    (None, ScopeSource::Corpus)
                }
            };
        }
        let Some(summaries) = &index.summaries else {
            degraded.push("summaries unavailable; searching the whole corpus".into());
            return (None, ScopeSource::Corpus);
        };
        let matches = summaries.search(&analysis.keywords);
        if matches.is_empty() {
            return (None, ScopeSource::Corpus);
        }
        let docs: DocSet = matches.into_iter().take(self.cfg.hierarchy.scope_docs.max(1)).map(|m| m.doc_id).collect();
        let n = docs.len();
        (Some(docs), ScopeSource::Summaries { documents: n })
    }
}
