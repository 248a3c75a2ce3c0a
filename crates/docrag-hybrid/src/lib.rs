//! docrag-hybrid
//!
//! Ties the engines together: builds every sub-index from documents, persists
//! and reloads them, and answers queries by narrowing the document set,
//! running keyword and vector search, and selecting under a token budget.
pub mod artifacts;
pub mod build;
pub mod retriever;
pub mod selector;
pub mod snapshot;

pub use artifacts::Manifest;
pub use build::{build_index, BuildOptions, BuildReport};
pub use retriever::{Retrieval, Retriever, ScopeSource, SearchMode};
pub use selector::{merge, select};
pub use snapshot::RetrievalIndex;
