//! Loading crawled documents from disk.
//!
//! `*.json` files hold one document or an array of documents in crawler
//! format. `*.md` and `*.txt` files become one document each, identified by
//! their path relative to the corpus root.

use crate::types::Document;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct CorpusLoader {
    limit: Option<usize>,
}

impl CorpusLoader {
    pub fn new() -> Self { Self::default() }

    /// Stop after this many source files.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn load_dir(&self, root: &Path) -> Result<Vec<Document>> {
        let mut files = list_source_files(root);
        if files.is_empty() {
            warn!(dir = %root.display(), "no .json, .md or .txt files found");
            return Ok(vec![]);
        }
        if let Some(limit) = self.limit {
            files.truncate(limit);
        }

        let mut docs = Vec::new();
        for path in &files {
            let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
            match ext {
                "json" => docs.extend(read_json(path)?),
                _ => docs.push(read_plain(root, path)?),
            }
        }
        // Later files win on duplicate ids.
        docs.reverse();
        let mut seen = std::collections::HashSet::new();
        docs.retain(|d| seen.insert(d.id.clone()));
        docs.reverse();
        info!(files = files.len(), documents = docs.len(), "loaded corpus");
        Ok(docs)
    }
}

fn read_json(path: &Path) -> Result<Vec<Document>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let docs = if value.is_array() {
        serde_json::from_value::<Vec<Document>>(value)
    } else {
        serde_json::from_value::<Document>(value).map(|d| vec![d])
    };
    docs.with_context(|| format!("{} is not a crawled document", path.display()))
}

fn read_plain(root: &Path, path: &Path) -> Result<Document> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
    let title = text
        .lines()
        .find_map(|l| l.strip_prefix("# ").map(|t| t.trim().to_string()))
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| rel.clone());
    Ok(Document::new(rel.clone(), rel, title, text))
}

fn list_source_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "md" | "txt")))
        .collect();
    files.sort();
    files
}
