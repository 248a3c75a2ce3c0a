pub mod overview;
pub mod summaries;
pub mod tree;

pub use overview::Overview;
pub use summaries::{DocSummary, ExtractiveSummarizer, MatchSpan, SummaryMatch, SummaryStore};
pub use tree::{DocRef, HierarchyNode, HierarchyTree};
