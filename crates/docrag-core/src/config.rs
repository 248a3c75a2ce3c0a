//! Configuration loader and typed retrieval options.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Everything the retrieval core reads lives under the `[retrieval]` table and
//! is extracted into [`RetrievalConfig`], which carries defaults for every
//! option and validates ranges before an index is built or queried.
use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(RetrievalConfig::default()).key("retrieval"))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name: env_name.to_string() };
        config.retrieval()?;
        Ok(config)
    }

    /// Wrap an already assembled figment (tests and embedders of the library).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment, env_name: "custom".to_string() }
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The typed, validated `[retrieval]` section.
    pub fn retrieval(&self) -> Result<RetrievalConfig> {
        let cfg: RetrievalConfig = match self.figment.find_value("retrieval") {
            Ok(_) => self
                .figment
                .extract_inner("retrieval")
                .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            Err(_) => RetrievalConfig::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size_tokens: usize,
    pub overlap_tokens: usize,
    /// Fraction of a chunk's tokens that must be code for `is_code`.
    pub code_dominance: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size_tokens: 512, overlap_tokens: 50, code_dominance: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub max_chunks: usize,
    pub max_tokens: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self { Self { max_chunks: 10, max_tokens: 30_000 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Hard admission gate on raw cosine similarity. Unset means the
    /// embedding provider's default, see [`RetrievalConfig::similarity_threshold`].
    pub similarity_threshold: Option<f32>,
    pub overfetch_factor: usize,
    pub min_informative_tokens: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { similarity_threshold: None, overfetch_factor: 3, min_informative_tokens: 20 }
    }
}

/// Re-ranking adjustments. Tunable heuristics, each bounded to `[0, 0.2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    pub intent: f32,
    pub how_to: f32,
    pub code_generation: f32,
    pub code: f32,
    pub keyword_cap: f32,
    pub difficulty: f32,
    pub short_penalty: f32,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self { intent: 0.2, how_to: 0.15, code_generation: 0.1, code: 0.1, keyword_cap: 0.15, difficulty: 0.1, short_penalty: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub enabled: bool,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Raw BM25 `s` is mapped to `s / (s + saturation)`.
    pub saturation: f32,
    pub snippet_chars: usize,
    pub max_matches_per_chunk: usize,
    pub max_total_matches: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self { enabled: true, bm25_k1: 1.2, bm25_b: 0.75, saturation: 2.0, snippet_chars: 120, max_matches_per_chunk: 5, max_total_matches: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    pub summary_words: usize,
    pub overview_words: usize,
    pub scope_docs: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self { Self { summary_words: 100, overview_words: 1000, scope_docs: 10 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProvider {
    Hash,
    BgeM3,
}

impl EmbeddingProvider {
    /// Gate used when `vector.similarity_threshold` is unset.
    ///
    /// Feature-hashed vectors only share the literal tokens of two texts, so
    /// related passages score around 0.2-0.6 and unrelated ones near zero.
    /// BGE-M3 places most of the corpus above 0.3 and needs a higher gate.
    pub fn default_similarity_threshold(self) -> f32 {
        match self {
            EmbeddingProvider::Hash => 0.15,
            EmbeddingProvider::BgeM3 => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub provider: EmbeddingProvider,
    pub dim: usize,
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { enabled: true, provider: EmbeddingProvider::Hash, dim: 384, model_dir: None, max_len: 512, batch_size: 32 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub artifacts_dir: String,
    pub cache_dir: String,
    pub documents_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: "dev_data/artifacts".to_string(),
            cache_dir: "dev_data/cache".to_string(),
            documents_dir: "dev_data/documents".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn artifacts(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.artifacts_dir) }
    pub fn cache(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.cache_dir) }
    pub fn documents(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.documents_dir) }
}

/// Every option the retrieval core recognises.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunking: ChunkingConfig,
    pub selection: SelectionConfig,
    pub vector: VectorConfig,
    pub boosts: BoostConfig,
    pub keyword: KeywordConfig,
    pub hierarchy: HierarchyConfig,
    pub embedding: EmbeddingConfig,
    pub paths: PathsConfig,
}

fn invalid(field: &str, msg: impl std::fmt::Display) -> Error {
    Error::InvalidConfig(format!("{}: {}", field, msg))
}

impl RetrievalConfig {
    /// The vector admission gate in effect: the configured value, or the
    /// provider default when none is set.
    pub fn similarity_threshold(&self) -> f32 {
        self.vector.similarity_threshold.unwrap_or_else(|| self.embedding.provider.default_similarity_threshold())
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if !(16..=8192).contains(&c.chunk_size_tokens) {
            return Err(invalid("chunking.chunk_size_tokens", format!("{} not in 16..=8192", c.chunk_size_tokens)));
        }
        if c.overlap_tokens >= c.chunk_size_tokens {
            return Err(invalid("chunking.overlap_tokens", format!("{} must be below chunk size {}", c.overlap_tokens, c.chunk_size_tokens)));
        }
        if !(c.code_dominance > 0.0 && c.code_dominance <= 1.0) {
            return Err(invalid("chunking.code_dominance", "must be in (0, 1]"));
        }

        if self.selection.max_chunks == 0 {
            return Err(invalid("selection.max_chunks", "must be at least 1"));
        }
        if self.selection.max_tokens == 0 {
            return Err(invalid("selection.max_tokens", "must be at least 1"));
        }

        let v = &self.vector;
        if let Some(t) = v.similarity_threshold {
            if !(-1.0..=1.0).contains(&t) {
                return Err(invalid("vector.similarity_threshold", format!("{} not in [-1, 1]", t)));
            }
        }
        if !(1..=10).contains(&v.overfetch_factor) {
            return Err(invalid("vector.overfetch_factor", "must be in 1..=10"));
        }

        let b = &self.boosts;
        for (name, value) in [
            ("boosts.intent", b.intent),
            ("boosts.how_to", b.how_to),
            ("boosts.code_generation", b.code_generation),
            ("boosts.code", b.code),
            ("boosts.keyword_cap", b.keyword_cap),
            ("boosts.difficulty", b.difficulty),
            ("boosts.short_penalty", b.short_penalty),
        ] {
            if !(0.0..=0.2).contains(&value) {
                return Err(invalid(name, format!("{} not in [0, 0.2]", value)));
            }
        }

        let k = &self.keyword;
        if k.bm25_k1 < 0.0 {
            return Err(invalid("keyword.bm25_k1", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&k.bm25_b) {
            return Err(invalid("keyword.bm25_b", "must be in [0, 1]"));
        }
        if k.saturation <= 0.0 {
            return Err(invalid("keyword.saturation", "must be positive"));
        }

        if self.hierarchy.summary_words == 0 || self.hierarchy.overview_words == 0 {
            return Err(invalid("hierarchy", "summary_words and overview_words must be positive"));
        }
        if self.embedding.dim == 0 {
            return Err(invalid("embedding.dim", "must be positive"));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be positive"));
        }
        if !self.keyword.enabled && !self.embedding.enabled {
            return Err(invalid("keyword.enabled", "keyword and embedding search cannot both be disabled"));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
