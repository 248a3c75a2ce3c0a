pub mod cache;
pub mod index;
pub mod rerank;
pub mod schema;
pub mod store;

pub use cache::{content_hash, CachedEmbedder};
pub use index::VectorIndex;
pub use rerank::Reranker;
pub use store::{load_chunks, save_chunks, StoredChunks};
