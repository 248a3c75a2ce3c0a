//! The immutable, fully built index a retriever serves queries from.

use std::sync::Arc;

use docrag_core::types::Chunk;
use docrag_hierarchy::{HierarchyTree, Overview, SummaryStore};
use docrag_text::KeywordIndex;
use docrag_vector::VectorIndex;

/// Every sub-index for one corpus. Never mutated once built; a rebuild makes
/// a new value and the retriever swaps it in.
pub struct RetrievalIndex {
    pub chunks: Vec<Arc<Chunk>>,
    pub document_count: usize,
    pub keyword: Option<KeywordIndex>,
    pub vector: Option<VectorIndex>,
    pub tree: Option<HierarchyTree>,
    pub summaries: Option<SummaryStore>,
    pub overview: Option<Overview>,
    /// Sub-indexes that were missing or unreadable when this index was assembled.
    pub notes: Vec<String>,
}

impl RetrievalIndex {
    pub fn embedder_id(&self) -> Option<&str> { self.vector.as_ref().map(VectorIndex::embedder_id) }

    pub fn dim(&self) -> Option<usize> { self.vector.as_ref().map(VectorIndex::dim) }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }
}

impl std::fmt::Debug for RetrievalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalIndex")
            .field("chunks", &self.chunks.len())
            .field("documents", &self.document_count)
            .field("keyword", &self.keyword.is_some())
            .field("vector", &self.embedder_id())
            .field("tree", &self.tree.is_some())
            .field("summaries", &self.summaries.as_ref().map(SummaryStore::len))
            .field("overview", &self.overview.is_some())
            .field("notes", &self.notes)
            .finish()
    }
}
