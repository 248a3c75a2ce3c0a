//! Lance-backed chunk store: one row per chunk with metadata, text and vector.
//!
//! The store is rewritten wholesale on every build; chunks are never updated
//! in place.
use anyhow::{anyhow, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_schema::{ArrowError, DataType};
use arrow_array::{Array, BooleanArray, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use docrag_core::types::{Chunk, ContentType, Difficulty};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::schema::{build_chunk_schema, CHUNKS_TABLE};

const WRITE_BATCH: usize = 1000;

/// Chunks as read back from disk, paired with their vectors when present.
#[derive(Debug, Default)]
pub struct StoredChunks {
    pub chunks: Vec<Chunk>,
    pub vectors: Option<Vec<Vec<f32>>>,
    /// Width of the vector column, if the store has one.
    pub dim: Option<usize>,
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
}

/// Replace the chunk store. `vectors`, when given, is `(rows, dim)` with one row per chunk.
pub async fn save_chunks(dir: &Path, chunks: &[Arc<Chunk>], vectors: Option<(&[Vec<f32>], usize)>) -> Result<()> {
    if let Some((rows, dim)) = vectors {
        if rows.len() != chunks.len() {
            return Err(anyhow!("{} chunks but {} vectors", chunks.len(), rows.len()));
        }
        if let Some(bad) = rows.iter().find(|v| v.len() != dim) {
            return Err(anyhow!("vector of length {} in a store of dimension {}", bad.len(), dim));
        }
    }
    let dim = vectors.map(|(_, d)| d);
    let dim_i32 = dim.map(|d| i32::try_from(d).unwrap_or(i32::MAX));
    let vectors = vectors.map(|(rows, _)| rows);

    let table_dir = dir.join(format!("{}.lance", CHUNKS_TABLE));
    if table_dir.exists() {
        std::fs::remove_dir_all(&table_dir).with_context(|| format!("removing {}", table_dir.display()))?;
    }
    let conn = open_db(dir).await?;
    let schema = build_chunk_schema(dim_i32);

    let mut batches = Vec::new();
    for (n, part) in chunks.chunks(WRITE_BATCH).enumerate() {
        let vec_part = vectors.map(|v| &v[n * WRITE_BATCH..n * WRITE_BATCH + part.len()]);
        batches.push(to_record_batch(part, vec_part, dim_i32)?);
    }
    let reader = RecordBatchIterator::new(batches.into_iter().map(Ok::<_, ArrowError>), schema);
    conn.create_table(CHUNKS_TABLE, Box::new(reader)).execute().await?;
    info!(chunks = chunks.len(), dim = ?dim, dir = %dir.display(), "saved chunk store");
    Ok(())
}

fn to_record_batch(chunks: &[Arc<Chunk>], vectors: Option<&[Vec<f32>]>, dim: Option<i32>) -> Result<RecordBatch> {
    let schema = build_chunk_schema(dim);
    let mut columns: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.doc_id.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.doc_path.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.source_url.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.doc_title.as_str()))),
        Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.seq as i32))),
        Arc::new(StringArray::from(chunks.iter().map(|c| c.section_title.clone()).collect::<Vec<_>>())),
        Arc::new(Int32Array::from(chunks.iter().map(|c| c.section_level.map(i32::from)).collect::<Vec<_>>())),
        Arc::new(BooleanArray::from(chunks.iter().map(|c| c.is_code).collect::<Vec<_>>())),
        Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.token_count as i32))),
        Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.overlap_len as i32))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.content_type.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.difficulty.as_str()))),
        Arc::new(BooleanArray::from(chunks.iter().map(|c| c.has_code_examples).collect::<Vec<_>>())),
    ];
    if let (Some(vectors), Some(dim)) = (vectors, dim) {
        let rows = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x))));
        columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(rows, dim)));
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn col<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("chunks.{} column missing or mistyped", name))
}

/// Read the chunk store, or `None` when no store has been written yet.
pub async fn load_chunks(dir: &Path) -> Result<Option<StoredChunks>> {
    if !dir.join(format!("{}.lance", CHUNKS_TABLE)).exists() {
        return Ok(None);
    }
    let conn = connect(dir.to_string_lossy().as_ref()).execute().await?;
    let names = conn.table_names().execute().await?;
    if !names.iter().any(|n| n == CHUNKS_TABLE) {
        return Ok(None);
    }
    let table = conn.open_table(CHUNKS_TABLE).execute().await?;
    let dim = match table.schema().await?.field_with_name("vector").map(|f| f.data_type().clone()) {
        Ok(DataType::FixedSizeList(_, n)) => Some(usize::try_from(n).unwrap_or(0)),
        _ => None,
    };
    let has_vectors = dim.is_some();

    let mut rows: Vec<(Chunk, Option<Vec<f32>>)> = Vec::new();
    let mut stream = table.query().execute().await?;
    while let Some(batch) = stream.try_next().await? {
        let ids = col::<StringArray>(&batch, "id")?;
        let doc_ids = col::<StringArray>(&batch, "doc_id")?;
        let doc_paths = col::<StringArray>(&batch, "doc_path")?;
        let urls = col::<StringArray>(&batch, "source_url")?;
        let titles = col::<StringArray>(&batch, "doc_title")?;
        let seqs = col::<Int32Array>(&batch, "seq")?;
        let section_titles = col::<StringArray>(&batch, "section_title")?;
        let section_levels = col::<Int32Array>(&batch, "section_level")?;
        let is_code = col::<BooleanArray>(&batch, "is_code")?;
        let token_counts = col::<Int32Array>(&batch, "token_count")?;
        let overlaps = col::<Int32Array>(&batch, "overlap_len")?;
        let texts = col::<StringArray>(&batch, "text")?;
        let content_types = col::<StringArray>(&batch, "content_type")?;
        let difficulties = col::<StringArray>(&batch, "difficulty")?;
        let has_code = col::<BooleanArray>(&batch, "has_code_examples")?;
        let vectors = if has_vectors { Some(col::<FixedSizeListArray>(&batch, "vector")?) } else { None };

        for i in 0..batch.num_rows() {
            let content_type = ContentType::parse(content_types.value(i))
                .ok_or_else(|| anyhow!("unknown content type '{}'", content_types.value(i)))?;
            let difficulty = Difficulty::parse(difficulties.value(i))
                .ok_or_else(|| anyhow!("unknown difficulty '{}'", difficulties.value(i)))?;
            let chunk = Chunk {
                id: ids.value(i).to_string(),
                doc_id: doc_ids.value(i).to_string(),
                doc_path: doc_paths.value(i).to_string(),
                source_url: urls.value(i).to_string(),
                doc_title: titles.value(i).to_string(),
                seq: seqs.value(i) as usize,
                section_title: (!section_titles.is_null(i)).then(|| section_titles.value(i).to_string()),
                section_level: (!section_levels.is_null(i)).then(|| u8::try_from(section_levels.value(i)).unwrap_or(u8::MAX)),
                is_code: is_code.value(i),
                token_count: token_counts.value(i) as usize,
                overlap_len: overlaps.value(i) as usize,
                text: texts.value(i).to_string(),
                content_type,
                difficulty,
                has_code_examples: has_code.value(i),
            };
            let vector = match vectors {
                Some(v) if v.is_valid(i) => Some(v.value(i).as_primitive::<Float32Type>().values().to_vec()),
                _ => None,
            };
            rows.push((chunk, vector));
        }
    }
    rows.sort_by(|(a, _), (b, _)| (&a.doc_path, &a.doc_id, a.seq).cmp(&(&b.doc_path, &b.doc_id, b.seq)));
    debug!(rows = rows.len(), "read chunk store");

    let vectors = if has_vectors {
        let mut out = Vec::with_capacity(rows.len());
        for (chunk, v) in &rows {
            out.push(v.clone().ok_or_else(|| anyhow!("chunk {} has no vector", chunk.id))?);
        }
        Some(out)
    } else {
        None
    };
    let chunks = rows.into_iter().map(|(c, _)| c).collect();
    Ok(Some(StoredChunks { chunks, vectors, dim }))
}
