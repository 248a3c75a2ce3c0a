//! Per-document summaries and keyword search over them.

use std::collections::BTreeMap;

use anyhow::Result;
use docrag_core::traits::Summarizer;
use docrag_core::types::{DocId, Document};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

const OVERVIEW_SOURCES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSummary {
    pub doc_id: DocId,
    pub path: String,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub word_count: usize,
    pub has_code: bool,
}

/// One summary per document, keyed by document id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryStore {
    entries: BTreeMap<DocId, DocSummary>,
}

/// Byte offset of a matched term in the summary text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSpan {
    pub term: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMatch {
    pub doc_id: DocId,
    pub matched_terms: usize,
    pub spans: Vec<MatchSpan>,
}

impl SummaryStore {
    pub fn new() -> Self { Self::default() }

    /// Summaries for `documents`, reusing `previous` entries unless `force` is set.
    /// Returns the store and how many entries were reused.
    pub fn generate(
        documents: &[Document],
        summarizer: &dyn Summarizer,
        max_words: usize,
        previous: Option<&SummaryStore>,
        force: bool,
    ) -> Result<(Self, usize)> {
        let reuse = if force { None } else { previous };
        let built: Vec<(DocSummary, bool)> = documents
            .par_iter()
            .map(|doc| -> Result<(DocSummary, bool)> {
                if let Some(old) = reuse.and_then(|p| p.get(&doc.id)) {
                    return Ok((old.clone(), true));
                }
                let summary = summarizer.summarize(doc, max_words)?;
                Ok((
                    DocSummary {
                        doc_id: doc.id.clone(),
                        path: doc.path(),
                        url: doc.url.clone(),
                        title: doc.title.clone(),
                        summary,
                        word_count: doc.text.split_whitespace().count(),
                        has_code: !doc.code_blocks.is_empty() || doc.text.contains("```"),
                    },
                    false,
                ))
            })
            .collect::<Result<_>>()?;
        let reused = built.iter().filter(|(_, r)| *r).count();
        let mut store = Self::new();
        for (s, _) in built {
            store.insert(s);
        }
        info!(summaries = store.len(), reused, "summaries ready");
        Ok((store, reused))
    }

    pub fn insert(&mut self, summary: DocSummary) { self.entries.insert(summary.doc_id.clone(), summary); }

    pub fn get(&self, doc_id: &str) -> Option<&DocSummary> { self.entries.get(doc_id) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &DocSummary> { self.entries.values() }

    /// `(doc_id, summary)` pairs in document id order.
    pub fn pairs(&self) -> Vec<(String, String)> { self.iter().map(|s| (s.doc_id.clone(), s.summary.clone())).collect() }

    /// Case-insensitive containment of each term in the summary or title.
    ///
    /// Documents are ranked by how many distinct terms they contain, ties by id.
    pub fn search(&self, terms: &[String]) -> Vec<SummaryMatch> {
        let mut terms: Vec<String> = terms.iter().map(|t| t.trim().to_ascii_lowercase()).filter(|t| !t.is_empty()).collect();
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<SummaryMatch> = self
            .entries
            .values()
            .filter_map(|s| {
                let summary = s.summary.to_ascii_lowercase();
                let title = s.title.to_ascii_lowercase();
                let mut matched_terms = 0;
                let mut spans = Vec::new();
                for term in &terms {
                    let at = summary.find(term.as_str());
                    if at.is_some() || title.contains(term.as_str()) {
                        matched_terms += 1;
                    }
                    if let Some(offset) = at {
                        spans.push(MatchSpan { term: term.clone(), offset });
                    }
                }
                (matched_terms > 0).then(|| SummaryMatch { doc_id: s.doc_id.clone(), matched_terms, spans })
            })
            .collect();
        out.sort_by(|a, b| b.matched_terms.cmp(&a.matched_terms).then_with(|| a.doc_id.cmp(&b.doc_id)));
        out
    }
}

/// Leading sentences of the document, prefixed by its title.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, document: &Document, max_words: usize) -> Result<String> {
        let title = if document.title.trim().is_empty() { "Untitled" } else { document.title.trim() };
        if document.text.trim().is_empty() {
            return Ok(format!("{title}: No content available."));
        }
        let mut parts: Vec<&str> = Vec::new();
        let mut words = 0;
        for sentence in sentences(&document.text) {
            let n = sentence.split_whitespace().count();
            if words + n > max_words {
                break;
            }
            parts.push(sentence);
            words += n;
        }
        let mut summary = if parts.is_empty() {
            // a first sentence longer than the budget is cut at a word boundary
            document.text.split_whitespace().take(max_words).collect::<Vec<_>>().join(" ")
        } else {
            parts.iter().map(|s| s.split_whitespace().collect::<Vec<_>>().join(" ")).collect::<Vec<_>>().join(". ")
        };
        if summary.is_empty() {
            return Ok(format!("{title}: Documentation page."));
        }
        if !summary.ends_with('.') {
            summary.push('.');
        }
        Ok(format!("{title}: {summary}"))
    }

    fn overview(&self, summaries: &[(String, String)], max_words: usize) -> Result<String> {
        let mut out = format!("Documentation Overview\n\nThis documentation covers {} pages.\n\nKey Topics:\n", summaries.len());
        let mut words = out.split_whitespace().count();
        for (_, summary) in summaries.iter().take(OVERVIEW_SOURCES) {
            let n = summary.split_whitespace().count();
            if words + n > max_words {
                break;
            }
            out.push('\n');
            out.push_str(summary);
            out.push('\n');
            words += n;
        }
        Ok(out)
    }
}

/// Sentences split after `.`, `!` or `?` followed by whitespace, terminators dropped.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || loop {
        if rest.is_empty() {
            return None;
        }
        let cut = rest.char_indices().zip(rest.chars().skip(1)).find(|&((_, c), next)| matches!(c, '.' | '!' | '?') && next.is_whitespace());
        let (sentence, tail) = match cut {
            Some(((i, c), _)) => (&rest[..i], &rest[i + c.len_utf8()..]),
            None => (rest.trim_end_matches(['.', '!', '?']), ""),
        };
        rest = tail.trim_start();
        let sentence = sentence.trim();
        if !sentence.is_empty() {
            return Some(sentence);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SummaryStore {
        let mut s = SummaryStore::new();
        for (id, title, text) in [
            ("b", "Sampling", "Use cudaq.sample to sample a quantum kernel and read counts."),
            ("a", "Observables", "Compute expectation values of spin operators with observe."),
            ("c", "Install", "Install with pip or use the docker container."),
        ] {
            s.insert(DocSummary {
                doc_id: id.into(),
                path: id.into(),
                url: id.into(),
                title: title.into(),
                summary: format!("{title}: {text}"),
                word_count: 10,
                has_code: false,
            });
        }
        s
    }

    #[test]
    fn search_ranks_by_matched_terms_then_id() {
        let hits = store().search(&["quantum".into(), "kernel".into(), "spin".into()]);
        assert_eq!(hits.iter().map(|h| h.doc_id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(hits[0].matched_terms, 2);

        let ties = store().search(&["use".into()]);
        assert_eq!(ties.iter().map(|h| h.doc_id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn search_is_case_insensitive_and_reports_spans() {
        let hits = store().search(&["DOCKER".into()]);
        assert_eq!(hits.len(), 1);
        let store = store();
        let summary = &store.get("c").unwrap().summary;
        let span = &hits[0].spans[0];
        assert_eq!(&summary[span.offset..span.offset + span.term.len()], "docker");
    }

    #[test]
    fn empty_terms_match_nothing() {
        assert!(store().search(&[]).is_empty());
        assert!(store().search(&["  ".into()]).is_empty());
    }

    #[test]
    fn extractive_summary_keeps_leading_sentences() {
        let doc = Document::new("d", "u", "Kernels", "First sentence here. Second one follows! Third is long enough to overflow the budget");
        let s = ExtractiveSummarizer.summarize(&doc, 6).unwrap();
        assert_eq!(s, "Kernels: First sentence here. Second one follows.");
        let empty = Document::new("e", "u", "Empty", "   ");
        assert_eq!(ExtractiveSummarizer.summarize(&empty, 10).unwrap(), "Empty: No content available.");
    }

    #[test]
    fn overview_stays_within_word_budget() {
        let pairs = store().pairs();
        let text = ExtractiveSummarizer.overview(&pairs, 25).unwrap();
        assert!(text.contains("covers 3 pages"));
        assert!(text.split_whitespace().count() <= 25);
    }
}
