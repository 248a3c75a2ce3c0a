pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;

use anyhow::Result;
use docrag_core::config::{EmbeddingConfig, EmbeddingProvider};
use docrag_core::traits::Embedder;
use tracing::info;

pub use hash::HashEmbedder;
pub use model::EmbeddingModel;
pub use pool::masked_mean_l2;

/// The embedder named by configuration. `APP_USE_FAKE_EMBEDDINGS=1` forces the hash embedder.
pub fn embedder_from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let force_hash = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let embedder: Arc<dyn Embedder> = match cfg.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(cfg.dim)),
        _ if force_hash => Arc::new(HashEmbedder::new(cfg.dim)),
        EmbeddingProvider::BgeM3 => Arc::new(EmbeddingModel::load(cfg.model_dir.as_deref(), cfg.max_len)?),
    };
    info!(embedder = %embedder.embedder_id(), "embedder ready");
    Ok(embedder)
}
