pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod profile;
pub mod query;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use config::RetrievalConfig;
pub use error::{Error, Result};
pub use query::{Intent, QueryAnalysis};
pub use types::{Candidate, Chunk, DocSet, Document, Provenance, SelectionResult, SourceKind};
