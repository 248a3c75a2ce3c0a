//! On-disk layout of a built index.
//!
//! ```text
//! <dir>/manifest.json   embedder id, dimension, counts, creation time
//! <dir>/chunks.lance/   chunk store (metadata, text, optional vector)
//! <dir>/hierarchy.json
//! <dir>/summaries.json
//! <dir>/overview.json
//! ```
//!
//! The manifest is written last, so a directory without one is an unfinished
//! build. Hierarchy, summaries and overview load independently; when one is
//! missing or unreadable the index is served without it.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use docrag_core::config::RetrievalConfig;
use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;
use docrag_hierarchy::{HierarchyTree, Overview, SummaryStore};
use docrag_text::KeywordIndex;
use docrag_vector::{load_chunks, save_chunks, VectorIndex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::snapshot::RetrievalIndex;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const HIERARCHY_FILE: &str = "hierarchy.json";
pub const SUMMARIES_FILE: &str = "summaries.json";
pub const OVERVIEW_FILE: &str = "overview.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub embedder_id: Option<String>,
    pub dim: Option<usize>,
    pub chunk_count: usize,
    pub document_count: usize,
    pub created_at: String,
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> anyhow::Result<()> {
    let path = dir.join(name);
    let tmp = dir.join(format!("{}.tmp", name));
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("renaming {}", path.display()))?;
    Ok(())
}

fn remove_stale(dir: &Path, name: &str) -> anyhow::Result<()> {
    let path = dir.join(name);
    if path.exists() {
        std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(())
}

/// Write every artifact of `index` under `dir`, replacing what was there.
pub async fn save(dir: &Path, index: &RetrievalIndex) -> anyhow::Result<Manifest> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    remove_stale(dir, MANIFEST_FILE)?;

    let vectors = index.vector.as_ref().map(|v| (v.vectors(), v.dim()));
    let chunks = match &index.vector {
        Some(v) => v.chunks(),
        None => index.chunks.as_slice(),
    };
    save_chunks(dir, chunks, vectors).await?;

    for (name, present) in [
        (HIERARCHY_FILE, index.tree.is_some()),
        (SUMMARIES_FILE, index.summaries.is_some()),
        (OVERVIEW_FILE, index.overview.is_some()),
    ] {
        if !present {
            remove_stale(dir, name)?;
        }
    }
    if let Some(tree) = &index.tree {
        write_json(dir, HIERARCHY_FILE, tree)?;
    }
    if let Some(summaries) = &index.summaries {
        write_json(dir, SUMMARIES_FILE, summaries)?;
    }
    if let Some(overview) = &index.overview {
        write_json(dir, OVERVIEW_FILE, overview)?;
    }

    let manifest = Manifest {
        version: FORMAT_VERSION,
        embedder_id: index.embedder_id().map(str::to_string),
        dim: index.dim(),
        chunk_count: chunks.len(),
        document_count: index.document_count,
        created_at: Utc::now().to_rfc3339(),
    };
    write_json(dir, MANIFEST_FILE, &manifest)?;
    info!(dir = %dir.display(), chunks = manifest.chunk_count, "artifacts saved");
    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| Error::IndexNotReady(format!("{}: {}", path.display(), e)))?;
    let manifest: Manifest =
        serde_json::from_str(&raw).map_err(|e| Error::CorruptArtifact(format!("{}: {}", path.display(), e)))?;
    if manifest.version != FORMAT_VERSION {
        return Err(Error::CorruptArtifact(format!("manifest version {} (expected {})", manifest.version, FORMAT_VERSION)));
    }
    Ok(manifest)
}

/// Optional artifact: `None`, with a note, when missing or unreadable.
fn read_optional<T: DeserializeOwned>(dir: &Path, name: &str, notes: &mut Vec<String>) -> Option<T> {
    let path = dir.join(name);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => {
            notes.push(format!("{} missing", name));
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "ignoring unreadable artifact");
            notes.push(format!("{} unreadable", name));
            None
        }
    }
}

/// Summaries and overview from an earlier build, for reuse by the next one.
pub fn load_previous(dir: &Path) -> (Option<SummaryStore>, Option<Overview>) {
    let mut notes = Vec::new();
    let summaries = read_optional(dir, SUMMARIES_FILE, &mut notes);
    let overview = read_optional(dir, OVERVIEW_FILE, &mut notes);
    (summaries, overview)
}

/// Assemble a [`RetrievalIndex`] from `dir`.
///
/// A vector column whose width differs from `embedder` is `EmbeddingMismatch`;
/// a chunk count that disagrees with the manifest is `CorruptArtifact`.
pub async fn load(dir: &Path, cfg: &RetrievalConfig, embedder: Option<&dyn Embedder>) -> Result<RetrievalIndex> {
    let manifest = read_manifest(dir)?;
    let stored = load_chunks(dir)
        .await
        .map_err(|e| Error::CorruptArtifact(format!("chunk store: {e}")))?
        .ok_or_else(|| Error::IndexNotReady(format!("no chunk store in {}", dir.display())))?;

    if stored.chunks.len() != manifest.chunk_count {
        return Err(Error::CorruptArtifact(format!(
            "manifest lists {} chunks, store has {}",
            manifest.chunk_count,
            stored.chunks.len()
        )));
    }
    if stored.dim != manifest.dim {
        return Err(Error::CorruptArtifact(format!("manifest dim {:?}, store dim {:?}", manifest.dim, stored.dim)));
    }
    if let (Some(found), Some(e)) = (stored.dim, embedder) {
        if e.dim() != found {
            return Err(Error::EmbeddingMismatch { expected: e.dim(), found });
        }
    }

    let chunks: Vec<Arc<_>> = stored.chunks.into_iter().map(Arc::new).collect();
    let mut notes = Vec::new();
    let keyword = if cfg.keyword.enabled { Some(KeywordIndex::build(chunks.clone(), &cfg.keyword)?) } else { None };
    let vector = match (stored.vectors, stored.dim) {
        (Some(vectors), Some(dim)) => {
            let id = manifest.embedder_id.clone().unwrap_or_default();
            Some(VectorIndex::build(chunks.clone(), vectors, id, dim)?)
        }
        _ => None,
    };

    let tree: Option<HierarchyTree> = read_optional(dir, HIERARCHY_FILE, &mut notes);
    let summaries: Option<SummaryStore> = read_optional(dir, SUMMARIES_FILE, &mut notes);
    let overview: Option<Overview> = read_optional(dir, OVERVIEW_FILE, &mut notes);
    if !notes.is_empty() {
        warn!(?notes, "loaded with missing artifacts");
    }
    info!(dir = %dir.display(), chunks = chunks.len(), vector = vector.is_some(), "artifacts loaded");

    Ok(RetrievalIndex {
        chunks,
        document_count: manifest.document_count,
        keyword,
        vector,
        tree,
        summaries,
        overview,
        notes,
    })
}
