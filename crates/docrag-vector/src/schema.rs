use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const CHUNKS_TABLE: &str = "chunks";
pub const CACHE_TABLE: &str = "emb_cache";

fn vector_field(dim: i32) -> Field {
    Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

/// Chunk store rows: metadata, text and, when embeddings are enabled, the vector.
pub fn build_chunk_schema(dim: Option<i32>) -> Arc<Schema> {
    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("doc_path", DataType::Utf8, false),
        Field::new("source_url", DataType::Utf8, false),
        Field::new("doc_title", DataType::Utf8, false),
        Field::new("seq", DataType::Int32, false),
        Field::new("section_title", DataType::Utf8, true),
        Field::new("section_level", DataType::Int32, true),
        Field::new("is_code", DataType::Boolean, false),
        Field::new("token_count", DataType::Int32, false),
        Field::new("overlap_len", DataType::Int32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("content_type", DataType::Utf8, false),
        Field::new("difficulty", DataType::Utf8, false),
        Field::new("has_code_examples", DataType::Boolean, false),
    ];
    if let Some(dim) = dim {
        fields.push(vector_field(dim));
    }
    Arc::new(Schema::new(fields))
}

pub fn build_cache_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("embedder_id", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        vector_field(dim),
    ]))
}
