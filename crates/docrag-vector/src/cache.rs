//! Lance-backed embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted before calling the embedder and collects misses,
//! which are written back in one batch after an index build. Entries whose
//! width differs from the embedder's dimension are ignored.
use anyhow::{anyhow, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::{ArrowError, DataType};
use chrono::Utc;
use docrag_core::traits::Embedder;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::schema::{build_cache_schema, CACHE_TABLE};
use crate::store::open_db;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

pub fn content_hash(text: &str) -> String { blake3::hash(text.as_bytes()).to_hex().to_string() }

async fn table_dim(conn: &Connection) -> Result<Option<i32>> {
    let names = conn.table_names().execute().await?;
    if !names.iter().any(|n| n == CACHE_TABLE) {
        return Ok(None);
    }
    let t = conn.open_table(CACHE_TABLE).execute().await?;
    Ok(match t.schema().await?.field_with_name("vector").map(|f| f.data_type().clone()) {
        Ok(DataType::FixedSizeList(_, n)) => Some(n),
        _ => None,
    })
}

/// Cached vectors for `embedder_id`, restricted to `hashes` when given.
pub async fn get_many(
    conn: &Connection,
    embedder_id: &str,
    dim: usize,
    hashes: Option<&HashSet<String>>,
) -> Result<HashMap<String, Vec<f32>>> {
    let mut out = HashMap::new();
    match table_dim(conn).await? {
        Some(d) if usize::try_from(d).ok() == Some(dim) => {}
        Some(d) => {
            debug!(cached = d, dim, "embedding cache has another width; ignoring");
            return Ok(out);
        }
        None => return Ok(out),
    }
    let t = conn.open_table(CACHE_TABLE).execute().await?;
    let mut stream = t.query().execute().await?;
    while let Some(batch) = stream.try_next().await? {
        let hash_col = batch
            .column_by_name("content_hash")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow!("emb_cache.content_hash column missing"))?;
        let eid_col = batch
            .column_by_name("embedder_id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow!("emb_cache.embedder_id column missing"))?;
        let vec_col = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow!("emb_cache.vector column missing"))?;
        for i in 0..batch.num_rows() {
            let h = hash_col.value(i);
            if eid_col.value(i) != embedder_id || hashes.is_some_and(|set| !set.contains(h)) {
                continue;
            }
            let vals = vec_col.value(i).as_primitive::<Float32Type>().values().to_vec();
            if vals.len() == dim {
                out.insert(h.to_string(), vals);
            }
        }
    }
    Ok(out)
}

/// Append entries, replacing the table first if it was written with another width.
pub async fn put_many(dir: &Path, entries: &[CacheEntry]) -> Result<()> {
    let Some(first) = entries.first() else { return Ok(()) };
    let dim = i32::try_from(first.vector.len()).context("vector too wide")?;
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != first.vector.len()) {
        return Err(anyhow!("cache entry {} has {} dims, expected {}", bad.content_hash, bad.vector.len(), dim));
    }
    let conn = open_db(dir).await?;
    match table_dim(&conn).await? {
        Some(d) if d == dim => {}
        existing => {
            if existing.is_some() {
                warn!(old = ?existing, new = dim, "embedding width changed; discarding cache");
                let table_dir = dir.join(format!("{}.lance", CACHE_TABLE));
                std::fs::remove_dir_all(&table_dir).with_context(|| format!("removing {}", table_dir.display()))?;
            }
            let schema = build_cache_schema(dim);
            let empty = RecordBatchIterator::new(Vec::<Result<RecordBatch, ArrowError>>::new(), schema);
            conn.create_table(CACHE_TABLE, Box::new(empty)).execute().await?;
        }
    }
    let t = conn.open_table(CACHE_TABLE).execute().await?;
    let now = Utc::now().timestamp_millis();
    let batch = RecordBatch::try_new(
        build_cache_schema(dim),
        vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.content_hash.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.embedder_id.as_str()))),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                entries.iter().map(|e| Some(e.vector.iter().map(|&x| Some(x)))),
                dim,
            )),
        ],
    )?;
    let reader = RecordBatchIterator::new(vec![Ok::<_, ArrowError>(batch)], build_cache_schema(dim));
    t.add(Box::new(reader)).execute().await?;
    Ok(())
}

/// An [`Embedder`] that answers from the cache first and remembers what it had to compute.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    known: RwLock<HashMap<String, Vec<f32>>>,
    pending: Mutex<Vec<CacheEntry>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedEmbedder {
    pub fn in_memory(inner: Arc<dyn Embedder>) -> Self {
        Self {
            inner,
            known: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Preload every entry stored under `cache_dir` for this embedder.
    pub async fn open(inner: Arc<dyn Embedder>, cache_dir: &Path) -> Result<Self> {
        let cached = Self::in_memory(inner);
        if cache_dir.join(format!("{}.lance", CACHE_TABLE)).exists() {
            let conn = open_db(cache_dir).await?;
            let map = get_many(&conn, &cached.inner.embedder_id(), cached.inner.dim(), None).await?;
            info!(entries = map.len(), dir = %cache_dir.display(), "embedding cache loaded");
            *cached.known.write() = map;
        }
        Ok(cached)
    }

    /// Write the misses collected so far and return how many were written.
    /// On failure the misses stay queued for the next flush.
    pub async fn flush(&self, cache_dir: &Path) -> Result<usize> {
        let entries = std::mem::take(&mut *self.pending.lock());
        if let Err(e) = put_many(cache_dir, &entries).await {
            let mut pending = self.pending.lock();
            let newer = std::mem::replace(&mut *pending, entries);
            pending.extend(newer);
            return Err(e);
        }
        if !entries.is_empty() {
            info!(entries = entries.len(), "embedding cache updated");
        }
        Ok(entries.len())
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (usize, usize) { (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed)) }
}

impl Embedder for CachedEmbedder {
    fn embedder_id(&self) -> String { self.inner.embedder_id() }

    fn dim(&self) -> usize { self.inner.dim() }

    fn max_len(&self) -> usize { self.inner.max_len() }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let mut out: Vec<Option<Vec<f32>>> = {
            let known = self.known.read();
            hashes.iter().map(|h| known.get(h).cloned()).collect()
        };
        let missing: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
        self.hits.fetch_add(texts.len() - missing.len(), Ordering::Relaxed);
        if !missing.is_empty() {
            self.misses.fetch_add(missing.len(), Ordering::Relaxed);
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.inner.embed_batch(&batch)?;
            if vectors.len() != batch.len() {
                return Err(anyhow!("embedder returned {} vectors for {} texts", vectors.len(), batch.len()));
            }
            let id = self.inner.embedder_id();
            let mut known = self.known.write();
            let mut pending = self.pending.lock();
            for (&i, v) in missing.iter().zip(vectors) {
                if known.insert(hashes[i].clone(), v.clone()).is_none() {
                    pending.push(CacheEntry { content_hash: hashes[i].clone(), embedder_id: id.clone(), vector: v.clone() });
                }
                out[i] = Some(v);
            }
        }
        out.into_iter().map(|v| v.ok_or_else(|| anyhow!("embedding missing after cache fill"))).collect()
    }
}
