//! Section-aware, code-aware chunking with token overlap.
//!
//! Tokens are whitespace-delimited words. Each token owns the whitespace that
//! follows it (the first token also owns any leading whitespace), so token
//! spans tile the document text exactly and every chunk is a byte slice of
//! the original. Stripping `overlap_len` bytes from every chunk after the
//! first and concatenating gives back the document.

use crate::config::ChunkingConfig;
use crate::profile::{profile, DocumentProfile};
use crate::types::{Chunk, Document, SectionMarker};
use std::ops::Range;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    code_dominance: f32,
}

impl Default for Chunker {
    fn default() -> Self { Self::new(&ChunkingConfig::default()) }
}

impl Chunker {
    pub fn new(cfg: &ChunkingConfig) -> Self {
        Self { chunk_size: cfg.chunk_size_tokens.max(1), overlap: cfg.overlap_tokens, code_dominance: cfg.code_dominance }
    }

    pub fn with_sizes(chunk_size_tokens: usize, overlap_tokens: usize) -> Self {
        Self { chunk_size: chunk_size_tokens.max(1), overlap: overlap_tokens, code_dominance: 0.5 }
    }

    /// Split a document into ordered chunks. Empty or whitespace-only text yields none.
    pub fn segment(&self, doc: &Document) -> Vec<Chunk> {
        self.segment_with_profile(doc, &profile(doc))
    }

    pub fn segment_with_profile(&self, doc: &Document, prof: &DocumentProfile) -> Vec<Chunk> {
        let text = doc.text.as_str();
        let tokens = Tokens::new(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let sections = sections(text, &doc.sections, &tokens);
        let code = CodeMap::new(text, &doc.code_blocks, &tokens);
        let doc_path = doc.path();

        let mut out = Vec::new();
        for section in &sections {
            for (window, overlap_tokens) in self.windows(section.tokens.clone(), &code) {
                let span = tokens.byte_range(window.clone());
                let overlap_len = tokens.byte_range(window.start..window.start + overlap_tokens).len();
                let len = window.len();
                let code_tokens = window.clone().filter(|&i| code.is_code(i)).count();
                let seq = out.len();
                out.push(Chunk {
                    id: Chunk::chunk_id(&doc.id, seq),
                    doc_id: doc.id.clone(),
                    doc_path: doc_path.clone(),
                    source_url: doc.url.clone(),
                    doc_title: doc.title.clone(),
                    seq,
                    section_title: section.title.clone(),
                    section_level: section.level,
                    is_code: code_tokens as f32 > self.code_dominance * len as f32,
                    token_count: len,
                    overlap_len,
                    text: text[span].to_string(),
                    content_type: prof.content_type,
                    difficulty: prof.difficulty,
                    has_code_examples: prof.has_code_examples,
                });
            }
        }
        debug!(doc_id = %doc.id, sections = sections.len(), chunks = out.len(), "segmented document");
        out
    }

    /// Token windows over one section, each paired with its leading overlap in tokens.
    fn windows(&self, section: Range<usize>, code: &CodeMap) -> Vec<(Range<usize>, usize)> {
        let units = code.units(section, self.chunk_size);
        let mut out: Vec<(Range<usize>, usize)> = Vec::new();
        let mut u = 0;
        while u < units.len() {
            let fresh_start = units[u].start;
            let first_len = units[u].len();
            let start = match out.last() {
                None => fresh_start,
                Some((prev, _)) => {
                    let wanted = fresh_start.saturating_sub(self.overlap);
                    // Shrink the overlap so an atomic unit that fits still fits with it.
                    let fit = (fresh_start + first_len).saturating_sub(self.chunk_size);
                    wanted.max(fit).max(prev.start + 1).min(fresh_start)
                }
            };
            let mut end = units[u].end;
            u += 1;
            while u < units.len() && units[u].end - start <= self.chunk_size {
                end = units[u].end;
                u += 1;
            }
            out.push((start..end, fresh_start - start));
        }
        out
    }
}

/// Convenience wrapper with the default code-dominance threshold.
pub fn segment(doc: &Document, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    Chunker::with_sizes(chunk_size_tokens, overlap_tokens).segment(doc)
}

struct Tokens {
    /// Byte offset where each word starts.
    word_starts: Vec<usize>,
    len: usize,
}

impl Tokens {
    fn new(text: &str) -> Self {
        let mut word_starts = Vec::new();
        let mut prev_ws = true;
        for (i, c) in text.char_indices() {
            let ws = c.is_whitespace();
            if !ws && prev_ws {
                word_starts.push(i);
            }
            prev_ws = ws;
        }
        Self { word_starts, len: text.len() }
    }

    fn is_empty(&self) -> bool { self.word_starts.is_empty() }

    fn count(&self) -> usize { self.word_starts.len() }

    /// Start of token `i`'s span (token 0 starts at byte 0).
    fn boundary(&self, i: usize) -> usize {
        if i == 0 { 0 } else { self.word_starts.get(i).copied().unwrap_or(self.len) }
    }

    fn byte_range(&self, r: Range<usize>) -> Range<usize> { self.boundary(r.start)..self.boundary(r.end) }

    /// Index of the first token whose word starts at or after `byte`.
    fn at_or_after(&self, byte: usize) -> usize { self.word_starts.partition_point(|&w| w < byte) }
}

struct Section {
    tokens: Range<usize>,
    title: Option<String>,
    level: Option<u8>,
}

/// Lines of `text` with their byte offsets, flagged when inside a fenced block.
fn lines_with_fences(text: &str) -> Vec<(usize, &str, bool)> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut in_fence = false;
    for line in text.split_inclusive('\n') {
        let is_fence = line.trim_start().starts_with("```");
        out.push((offset, line, in_fence || is_fence));
        if is_fence {
            in_fence = !in_fence;
        }
        offset += line.len();
    }
    out
}

fn header_body(line: &str) -> &str {
    line.trim_start().trim_start_matches('#').trim()
}

/// Markers located at line starts: crawler markers matched in order, or ATX headers.
fn locate_headers(text: &str, markers: &[SectionMarker]) -> Vec<(usize, SectionMarker)> {
    let lines = lines_with_fences(text);
    if markers.is_empty() {
        return lines
            .iter()
            .filter(|(_, _, fenced)| !fenced)
            .filter_map(|(offset, line, _)| {
                let trimmed = line.trim_start();
                let level = trimmed.chars().take_while(|&c| c == '#').count();
                let rest = &trimmed[level..];
                if (1..=6).contains(&level) && rest.starts_with([' ', '\t']) && !rest.trim().is_empty() {
                    let level = u8::try_from(level).unwrap_or(6);
                    Some((*offset, SectionMarker { level, text: rest.trim().to_string() }))
                } else {
                    None
                }
            })
            .collect();
    }

    let mut out = Vec::new();
    let mut cursor = 0;
    for marker in markers {
        let needle = marker.text.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let hit = lines[cursor..]
            .iter()
            .position(|(_, line, fenced)| !fenced && header_body(line).to_lowercase().starts_with(&needle));
        if let Some(pos) = hit {
            out.push((lines[cursor + pos].0, marker.clone()));
            cursor += pos + 1;
        }
    }
    out
}

fn sections(text: &str, markers: &[SectionMarker], tokens: &Tokens) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut start = 0;
    let mut title = None;
    let mut level = None;
    for (offset, marker) in locate_headers(text, markers) {
        let at = tokens.at_or_after(offset);
        if at > start {
            sections.push(Section { tokens: start..at, title: title.take(), level: level.take() });
            start = at;
        }
        title = Some(marker.text);
        level = Some(marker.level);
    }
    if start < tokens.count() {
        sections.push(Section { tokens: start..tokens.count(), title, level });
    }
    sections
}

/// Which tokens belong to code, grouped by the block they came from.
struct CodeMap {
    /// Token ranges of code blocks, sorted and disjoint.
    blocks: Vec<Range<usize>>,
}

impl CodeMap {
    fn new(text: &str, code_blocks: &[String], tokens: &Tokens) -> Self {
        let mut spans: Vec<Range<usize>> = Vec::new();

        let mut open: Option<usize> = None;
        for (offset, line, _) in lines_with_fences(text) {
            if line.trim_start().starts_with("```") {
                match open.take() {
                    None => open = Some(offset),
                    Some(s) => spans.push(s..offset + line.len()),
                }
            }
        }
        if let Some(s) = open {
            spans.push(s..text.len());
        }

        for block in code_blocks {
            let needle = block.trim();
            if needle.is_empty() {
                continue;
            }
            spans.extend(text.match_indices(needle).map(|(i, m)| i..i + m.len()));
        }

        spans.sort_by_key(|r| (r.start, r.end));
        let mut merged: Vec<Range<usize>> = Vec::new();
        for span in spans {
            match merged.last_mut() {
                Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
                _ => merged.push(span),
            }
        }

        let blocks = merged
            .into_iter()
            .map(|r| tokens.at_or_after(r.start)..tokens.at_or_after(r.end))
            .filter(|r| !r.is_empty())
            .collect();
        Self { blocks }
    }

    fn block_of(&self, token: usize) -> Option<&Range<usize>> {
        let idx = self.blocks.partition_point(|b| b.end <= token);
        self.blocks.get(idx).filter(|b| b.contains(&token))
    }

    fn is_code(&self, token: usize) -> bool { self.block_of(token).is_some() }

    /// Packing units for a section: a code block that fits is one atomic unit,
    /// anything else is one unit per token.
    fn units(&self, section: Range<usize>, chunk_size: usize) -> Vec<Range<usize>> {
        let mut units = Vec::new();
        let mut i = section.start;
        while i < section.end {
            let unit = match self.block_of(i) {
                Some(b) => {
                    let clipped = i..b.end.min(section.end);
                    if clipped.len() <= chunk_size { clipped } else { i..i + 1 }
                }
                None => i..i + 1,
            };
            i = unit.end;
            units.push(unit);
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            out.push_str(if i == 0 { &c.text } else { c.fresh_text() });
        }
        out
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_and_whitespace_documents_produce_nothing() {
        assert!(segment(&Document::new("d", "u", "t", ""), 32, 4).is_empty());
        assert!(segment(&Document::new("d", "u", "t", "  \n\t "), 32, 4).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk_with_the_whole_text() {
        let doc = Document::new("d", "u", "t", "  just a few words\n");
        let chunks = segment(&doc, 32, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, doc.text);
        assert_eq!(chunks[0].overlap_len, 0);
        assert_eq!(chunks[0].id, "d:0");
    }

    #[test]
    fn long_section_uses_overlapping_windows() {
        let doc = Document::new("d", "u", "t", words(100));
        let chunks = segment(&doc, 40, 10);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.token_count <= 40));
        assert!(chunks[1].text.starts_with("w30 "), "{}", chunks[1].text);
        assert_eq!(rebuild(&chunks), doc.text);
    }

    #[test]
    fn sections_split_at_headers_and_carry_titles() {
        let text = "Intro line\n# Install\nrun the installer\n## Usage\nimport cudaq\n";
        let doc = Document::new("d", "https://h/docs/a.html", "A", text).with_section(1, "Install").with_section(2, "Usage");
        let chunks = segment(&doc, 64, 8);
        let titles: Vec<_> = chunks.iter().map(|c| c.section_title.as_deref()).collect();
        assert_eq!(titles, vec![None, Some("Install"), Some("Usage")]);
        assert_eq!(chunks[2].section_level, Some(2));
        assert!(chunks[1].text.starts_with("# Install"));
        assert_eq!(chunks[1].overlap_len, 0);
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn markdown_headers_are_used_without_markers() {
        let text = "# One\nalpha\n```\n# not a header\n```\n## Two\nbeta\n";
        let doc = Document::new("d", "u", "t", text);
        let chunks = segment(&doc, 64, 8);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].section_title.as_deref(), Some("Two"));
        assert!(chunks[0].text.contains("# not a header"));
    }

    #[test]
    fn fitting_code_block_is_not_split() {
        let code = "```python\nimport cudaq\nkernel = cudaq.make_kernel()\nqubits = kernel.qalloc(2)\n```\n";
        let text = format!("{}\n{}{}", words(10), code, words(4));
        let doc = Document::new("d", "u", "t", text.as_str());
        let chunks = segment(&doc, 14, 2);
        let holder = chunks.iter().find(|c| c.text.contains("```python")).expect("code chunk");
        assert!(holder.text.contains("qalloc(2)\n```"), "{}", holder.text);
        assert!(holder.is_code);
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn oversized_code_block_is_split() {
        let body = (0..40).map(|i| format!("x{} = {}", i, i)).collect::<Vec<_>>().join("\n");
        let text = format!("```\n{}\n```\n", body);
        let doc = Document::new("d", "u", "t", text.as_str());
        let chunks = segment(&doc, 32, 4);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= 32 && c.is_code));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn crawler_code_blocks_mark_code_without_fences() {
        let code = "cudaq.sample(kernel, shots_count=1000)";
        let doc = Document::new("d", "u", "t", code).with_code_block(code);
        let chunks = segment(&doc, 32, 4);
        assert!(chunks[0].is_code);
    }

    #[test]
    fn ids_are_stable() {
        let doc = Document::new("doc-7", "u", "t", words(90));
        let a: Vec<_> = segment(&doc, 30, 5).into_iter().map(|c| c.id).collect();
        let b: Vec<_> = segment(&doc, 30, 5).into_iter().map(|c| c.id).collect();
        assert_eq!(a, b);
        assert_eq!(a[0], "doc-7:0");
        assert_eq!(a[1], "doc-7:1");
    }
}
