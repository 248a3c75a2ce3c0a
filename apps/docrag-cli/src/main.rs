use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use docrag_core::config::{Config, RetrievalConfig};
use docrag_core::corpus::CorpusLoader;
use docrag_core::traits::Embedder;
use docrag_core::QueryAnalysis;
use docrag_embed::embedder_from_config;
use docrag_hierarchy::ExtractiveSummarizer;
use docrag_hybrid::artifacts;
use docrag_hybrid::{build_index, BuildOptions, RetrievalIndex, Retriever};
use docrag_text::GrepOptions;
use docrag_vector::CachedEmbedder;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: docrag <command> [args...]

  ingest [DOCS_DIR] [--force] [--limit N]     build and save the index
  query \"<text>\" [--scope PREFIX] [--json]     retrieve context for a question
  grep <PATTERN> [--regex] [--case-sensitive] [--scope PREFIX]
  scope [PREFIX]                              browse the document hierarchy";

struct Args {
    positional: Vec<String>,
    flags: HashSet<String>,
    options: HashMap<String, String>,
}

impl Args {
    fn flag(&self, name: &str) -> bool { self.flags.contains(name) }

    fn option(&self, name: &str) -> Option<&str> { self.options.get(name).map(String::as_str) }
}

const VALUE_OPTIONS: &[&str] = &["--limit", "--scope"];

fn parse_args() -> Result<(String, Args)> {
    let mut raw = env::args().skip(1);
    let cmd = raw.next().ok_or_else(|| anyhow!("{USAGE}"))?;
    let mut args = Args { positional: Vec::new(), flags: HashSet::new(), options: HashMap::new() };
    while let Some(a) = raw.next() {
        if VALUE_OPTIONS.contains(&a.as_str()) {
            let value = raw.next().ok_or_else(|| anyhow!("{a} requires a value"))?;
            args.options.insert(a, value);
        } else if a.starts_with("--") {
            args.flags.insert(a);
        } else {
            args.positional.push(a);
        }
    }
    Ok((cmd, args))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,docrag=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let (cmd, args) = parse_args()?;
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let cfg = config.retrieval()?;
    let base = env::current_dir()?;
    let rt = Runtime::new()?;
    match cmd.as_str() {
        "ingest" => ingest(&rt, &cfg, &base, &args),
        "query" => query(&rt, &cfg, &base, &args),
        "grep" => grep(&rt, &cfg, &base, &args),
        "scope" => scope(&rt, &cfg, &base, &args),
        other => Err(anyhow!("unknown command '{other}'\n\n{USAGE}")),
    }
}

fn ingest(rt: &Runtime, cfg: &RetrievalConfig, base: &Path, args: &Args) -> Result<()> {
    let docs_dir = args.positional.first().map_or_else(|| cfg.paths.documents(base), PathBuf::from);
    let mut loader = CorpusLoader::new();
    if let Some(n) = args.option("--limit") {
        loader = loader.with_limit(n.parse().context("--limit expects a number")?);
    }
    let documents = loader.load_dir(&docs_dir)?;
    println!("Loaded {} documents from {}", documents.len(), docs_dir.display());

    let artifacts_dir = cfg.paths.artifacts(base);
    let cache_dir = cfg.paths.cache(base);
    let (previous_summaries, previous_overview) = artifacts::load_previous(&artifacts_dir);

    let embedder = if cfg.embedding.enabled {
        let inner = embedder_from_config(&cfg.embedding)?;
        Some(rt.block_on(CachedEmbedder::open(inner, &cache_dir))?)
    } else {
        None
    };

    let pb = ProgressBar::no_length();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} chunks embedded ({per_sec})")?);
    let opts = BuildOptions {
        force: args.flag("--force"),
        previous_summaries: previous_summaries.as_ref(),
        previous_overview,
        progress: Some(&pb),
    };
    let (index, report) =
        build_index(&documents, cfg, embedder.as_ref().map(|e| e as &dyn Embedder), &ExtractiveSummarizer, opts)?;
    pb.finish_and_clear();

    if let Some(e) = &embedder {
        let written = rt.block_on(e.flush(&cache_dir))?;
        let (hits, misses) = e.stats();
        println!("Embedding cache: {hits} hits, {misses} misses, {written} new entries");
    }
    let manifest = rt.block_on(artifacts::save(&artifacts_dir, &index))?;
    println!(
        "Indexed {} documents into {} chunks ({} embedded, {} summaries reused{})",
        report.documents,
        report.chunks,
        report.embedded,
        report.summaries_reused,
        if report.overview_rebuilt { ", overview rebuilt" } else { "" }
    );
    println!("Artifacts written to {} (embedder: {})", artifacts_dir.display(), manifest.embedder_id.as_deref().unwrap_or("none"));
    Ok(())
}

fn load_index(rt: &Runtime, cfg: &RetrievalConfig, base: &Path, embedder: Option<&dyn Embedder>) -> Result<RetrievalIndex> {
    Ok(rt.block_on(artifacts::load(&cfg.paths.artifacts(base), cfg, embedder))?)
}

fn query(rt: &Runtime, cfg: &RetrievalConfig, base: &Path, args: &Args) -> Result<()> {
    let text = args.positional.join(" ");
    if text.trim().is_empty() {
        return Err(anyhow!("query needs text\n\n{USAGE}"));
    }
    let embedder = if cfg.embedding.enabled {
        match embedder_from_config(&cfg.embedding) {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "embedder unavailable; keyword search only");
                None
            }
        }
    } else {
        None
    };
    let index = load_index(rt, cfg, base, embedder.as_deref())?;
    let retriever = Retriever::new(cfg.clone(), embedder)?;
    retriever.install(index)?;

    let analysis = QueryAnalysis::analyze(&text);
    let out = retriever.retrieve(&text, &analysis, args.option("--scope"))?;
    for note in &out.degraded {
        eprintln!("note: {note}");
    }
    if args.flag("--json") {
        let entries: Vec<_> = out
            .selection
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "chunk_id": e.chunk.id,
                    "doc_id": e.chunk.doc_id,
                    "score": e.score,
                    "tokens": e.chunk.token_count,
                    "provenance": e.provenance,
                    "source_url": e.chunk.source_url,
                })
            })
            .collect();
        let body = serde_json::json!({
            "query": analysis,
            "mode": out.mode,
            "scope": out.scope,
            "total_tokens": out.selection.total_tokens,
            "oversized": out.selection.oversized,
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", out.selection.format_context());
        eprintln!(
            "{} chunks, {} tokens, mode {:?}, scope {:?}",
            out.selection.len(),
            out.selection.total_tokens,
            out.mode,
            out.scope
        );
    }
    Ok(())
}

fn grep(rt: &Runtime, cfg: &RetrievalConfig, base: &Path, args: &Args) -> Result<()> {
    let pattern = args.positional.first().ok_or_else(|| anyhow!("grep needs a pattern\n\n{USAGE}"))?;
    let index = load_index(rt, cfg, base, None)?;
    let keyword = index.keyword.as_ref().ok_or_else(|| anyhow!("keyword search is disabled"))?;
    let scope = match (args.option("--scope"), &index.tree) {
        (Some(prefix), Some(tree)) => Some(tree.resolve(prefix)),
        (Some(_), None) => {
            warn!("hierarchy unavailable; --scope ignored");
            None
        }
        (None, _) => None,
    };
    let opts = GrepOptions { case_sensitive: args.flag("--case-sensitive"), is_regex: args.flag("--regex") };
    let matches = keyword.grep(pattern, scope.as_ref(), opts)?;
    for m in &matches {
        println!("{}@{}: {}", m.chunk_id, m.offset, m.snippet);
    }
    eprintln!("{} matches", matches.len());
    Ok(())
}

fn scope(rt: &Runtime, cfg: &RetrievalConfig, base: &Path, args: &Args) -> Result<()> {
    let prefix = args.positional.first().map_or("", String::as_str);
    let index = load_index(rt, cfg, base, None)?;
    let tree = index.tree.as_ref().ok_or_else(|| anyhow!("hierarchy artifact missing; run ingest"))?;
    let Some(node) = tree.node(prefix) else {
        println!("No documents under '{prefix}'");
        return Ok(());
    };
    println!("/{} ({} documents)", prefix.trim_matches('/'), node.doc_count());
    for name in node.subdirs.keys() {
        println!("  {name}/");
    }
    for doc in &node.documents {
        let summary = index.summaries.as_ref().and_then(|s| s.get(&doc.doc_id)).map_or("", |s| s.summary.as_str());
        println!("  {} [{}] {}", doc.filename, doc.doc_id, doc.title);
        if !summary.is_empty() {
            println!("      {summary}");
        }
    }
    Ok(())
}
