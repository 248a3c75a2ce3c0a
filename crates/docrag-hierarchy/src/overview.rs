//! Corpus overview, rebuilt only when the summaries behind it change.

use anyhow::Result;
use docrag_core::traits::Summarizer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::summaries::SummaryStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub text: String,
    /// blake3 of the summaries this overview was built from.
    pub fingerprint: String,
    pub document_count: usize,
}

pub fn fingerprint(summaries: &SummaryStore) -> String {
    let mut hasher = blake3::Hasher::new();
    for s in summaries.iter() {
        hasher.update(s.doc_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(s.summary.as_bytes());
        hasher.update(&[0xff]);
    }
    hasher.finalize().to_hex().to_string()
}

impl Overview {
    pub fn build(summarizer: &dyn Summarizer, summaries: &SummaryStore, max_words: usize) -> Result<Self> {
        let text = summarizer.overview(&summaries.pairs(), max_words)?;
        info!(words = text.split_whitespace().count(), "overview generated");
        Ok(Self { text, fingerprint: fingerprint(summaries), document_count: summaries.len() })
    }

    pub fn is_current(&self, summaries: &SummaryStore) -> bool { self.fingerprint == fingerprint(summaries) }

    /// Keep `previous` when it still matches the summaries, otherwise rebuild.
    /// The flag reports whether a new overview was generated.
    pub fn refresh(
        previous: Option<Overview>,
        summarizer: &dyn Summarizer,
        summaries: &SummaryStore,
        max_words: usize,
    ) -> Result<(Self, bool)> {
        match previous {
            Some(old) if old.is_current(summaries) => {
                debug!("overview unchanged");
                Ok((old, false))
            }
            _ => Ok((Self::build(summarizer, summaries, max_words)?, true)),
        }
    }
}
