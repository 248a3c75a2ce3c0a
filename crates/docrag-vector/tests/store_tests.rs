use std::sync::Arc;

use docrag_core::traits::Embedder;
use docrag_core::types::{Chunk, Document};
use docrag_core::Chunker;
use docrag_embed::HashEmbedder;
use docrag_vector::{load_chunks, save_chunks, CachedEmbedder};

fn sample_chunks() -> Vec<Arc<Chunk>> {
    let docs = vec![
        Document::new("b", "https://x.org/guide/b.html", "Guide B", "alpha beta gamma ".repeat(30))
            .with_section(1, "alpha beta"),
        Document::new("a", "https://x.org/api/a.html", "API A", "kernel sample observe ".repeat(10)),
    ];
    let chunker = Chunker::with_sizes(32, 4);
    docs.iter().flat_map(|d| chunker.segment(d)).map(Arc::new).collect()
}

#[tokio::test]
async fn chunk_store_round_trip_with_vectors() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let chunks = sample_chunks();
    let embedder = HashEmbedder::new(16);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts)?;

    save_chunks(tmp.path(), &chunks, Some((&vectors, 16))).await?;
    let stored = load_chunks(tmp.path()).await?.expect("store present");

    assert_eq!(stored.dim, Some(16));
    assert_eq!(stored.chunks.len(), chunks.len());
    // rows come back ordered by document path, then sequence
    let mut expected: Vec<&Chunk> = chunks.iter().map(|c| c.as_ref()).collect();
    expected.sort_by(|a, b| (&a.doc_path, &a.doc_id, a.seq).cmp(&(&b.doc_path, &b.doc_id, b.seq)));
    for (got, want) in stored.chunks.iter().zip(&expected) {
        assert_eq!(got, *want);
    }
    let back = stored.vectors.expect("vectors");
    let first = chunks.iter().position(|c| c.id == stored.chunks[0].id).unwrap();
    assert_eq!(back[0], vectors[first]);
    Ok(())
}

#[tokio::test]
async fn chunk_store_without_vectors_and_rewrite() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    assert!(load_chunks(tmp.path()).await?.is_none());

    let chunks = sample_chunks();
    save_chunks(tmp.path(), &chunks, None).await?;
    let stored = load_chunks(tmp.path()).await?.expect("store present");
    assert!(stored.vectors.is_none());
    assert_eq!(stored.dim, None);

    save_chunks(tmp.path(), &chunks[..1], None).await?;
    assert_eq!(load_chunks(tmp.path()).await?.expect("store").chunks.len(), 1);
    Ok(())
}

#[tokio::test]
async fn save_rejects_vector_count_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let chunks = sample_chunks();
    let vectors = vec![vec![0.0; 4]];
    assert!(save_chunks(tmp.path(), &chunks, Some((&vectors, 4))).await.is_err());
}

#[tokio::test]
async fn cached_embedder_reuses_persisted_vectors() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let texts = vec!["cudaq.sample counts".to_string(), "observe spin operators".to_string()];

    let first = CachedEmbedder::open(Arc::new(HashEmbedder::new(8)), tmp.path()).await?;
    let a = first.embed_batch(&texts)?;
    assert_eq!(first.stats(), (0, 2));
    assert_eq!(first.flush(tmp.path()).await?, 2);

    let second = CachedEmbedder::open(Arc::new(HashEmbedder::new(8)), tmp.path()).await?;
    let b = second.embed_batch(&texts)?;
    assert_eq!(second.stats(), (2, 0));
    assert_eq!(a, b);
    assert_eq!(second.flush(tmp.path()).await?, 0);

    // another width never reads these entries
    let wide = CachedEmbedder::open(Arc::new(HashEmbedder::new(12)), tmp.path()).await?;
    let c = wide.embed_batch(&texts)?;
    assert_eq!(wide.stats(), (0, 2));
    assert_eq!(c[0].len(), 12);
    assert_eq!(wide.flush(tmp.path()).await?, 2);
    Ok(())
}

#[tokio::test]
async fn failed_flush_keeps_misses_for_the_next_one() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let blocked = tmp.path().join("not-a-dir");
    std::fs::write(&blocked, "occupied")?;
    let texts = vec!["first text".to_string(), "second text".to_string()];

    let cached = CachedEmbedder::in_memory(Arc::new(HashEmbedder::new(8)));
    cached.embed_batch(&texts)?;
    assert!(cached.flush(&blocked).await.is_err());

    let cache_dir = tmp.path().join("cache");
    assert_eq!(cached.flush(&cache_dir).await?, 2);
    assert_eq!(cached.flush(&cache_dir).await?, 0);

    let reopened = CachedEmbedder::open(Arc::new(HashEmbedder::new(8)), &cache_dir).await?;
    reopened.embed_batch(&texts)?;
    assert_eq!(reopened.stats(), (2, 0));
    Ok(())
}
