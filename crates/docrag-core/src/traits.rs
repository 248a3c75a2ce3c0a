use crate::types::Document;

/// Maps text to fixed-dimension vectors. Must be a pure function of the text.
pub trait Embedder: Send + Sync {
    /// Stable identifier of model + dimensionality; vectors from different ids never mix.
    fn embedder_id(&self) -> String;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Produces per-document synopses and the corpus overview.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, document: &Document, max_words: usize) -> anyhow::Result<String>;
    fn overview(&self, summaries: &[(String, String)], max_words: usize) -> anyhow::Result<String>;
}
