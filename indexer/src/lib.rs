use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use engine::config::EngineConfig;
use engine::eval::{self, BenchmarkQuery, Metrics};
use engine::{DocId, RankingMode, RelatedPair, SearchModel};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reads one document per line. A directory contributes every `*.txt` file
/// below it, in sorted path order.
pub fn load_collection(path: &Path) -> Result<Vec<String>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking {}", path.display()))?;
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("txt") {
                files.push(p.to_path_buf());
            }
        }
    } else {
        files.push(path.to_path_buf());
    }

    let mut docs = Vec::new();
    for file in &files {
        let text = fs::read_to_string(file).with_context(|| format!("reading collection {}", file.display()))?;
        docs.extend(text.lines().map(str::to_string));
    }
    tracing::info!(files = files.len(), num_docs = docs.len(), "loaded collection");
    Ok(docs)
}

pub fn load_benchmark(path: &Path) -> Result<Vec<BenchmarkQuery>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading benchmark {}", path.display()))?;
    let queries = eval::parse_benchmark(&text).with_context(|| format!("parsing benchmark {}", path.display()))?;
    Ok(queries)
}

/// Engine config from an optional JSON file, then command-line overrides.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::from_json_file(p).with_context(|| format!("loading config {}", p.display()))?,
        None => EngineConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Flags that take precedence over the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// BM25 term-frequency saturation
    #[arg(long, global = true)]
    pub k1: Option<f64>,
    /// BM25 length normalization
    #[arg(long, global = true)]
    pub b: Option<f64>,
    /// Keep only the m most frequent terms in the matrix
    #[arg(long, global = true)]
    pub max_terms: Option<usize>,
    /// L2-normalize document columns
    #[arg(long, global = true)]
    pub l2_normalize: bool,
    /// Latent rank for LSI
    #[arg(long, global = true)]
    pub rank: Option<usize>,
    /// Skip the SVD
    #[arg(long, global = true, conflicts_with = "rank")]
    pub no_lsi: bool,
    /// Number of k-means clusters
    #[arg(long, global = true)]
    pub clusters: Option<usize>,
    /// Seed for k-means initialization
    #[arg(long, global = true)]
    pub seed: Option<u64>,
    /// Weight of vector-space metrics in the blended report
    #[arg(long, global = true)]
    pub lambda: Option<f64>,
    /// Drop tokens shorter than this
    #[arg(long, global = true)]
    pub min_token_len: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(k1) = self.k1 { config.bm25.k1 = k1; }
        if let Some(b) = self.b { config.bm25.b = b; }
        if let Some(m) = self.max_terms { config.matrix.max_terms = Some(m); }
        if self.l2_normalize { config.matrix.l2_normalize = true; }
        if self.no_lsi {
            config.lsi = None;
        } else if let Some(rank) = self.rank {
            config.lsi.get_or_insert_with(Default::default).rank = rank;
        }
        if let Some(clusters) = self.clusters { config.kmeans.clusters = clusters; }
        if let Some(seed) = self.seed { config.kmeans.seed = Some(seed); }
        if let Some(lambda) = self.lambda { config.blend_lambda = lambda; }
        if let Some(min_len) = self.min_token_len { config.tokenizer.min_len = min_len; }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Bm25,
    Vsm,
    Lsi,
}

impl From<Mode> for RankingMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Bm25 => RankingMode::Bm25,
            Mode::Vsm => RankingMode::VectorSpace,
            Mode::Lsi => RankingMode::LatentSemantic,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BenchmarkReport {
    pub generated_at: String,
    pub num_docs: usize,
    pub num_queries: usize,
    pub bm25: Metrics,
    pub vector_space: Metrics,
    pub latent_semantic: Option<Metrics>,
    pub lambda: f64,
    /// `lambda * vector_space + (1 - lambda) * latent_semantic`
    pub blended: Option<Metrics>,
}

/// Scores every ranking mode the model supports over the benchmark.
pub fn run_benchmark(model: &SearchModel, queries: &[BenchmarkQuery]) -> Result<BenchmarkReport> {
    let bm25 = model.evaluate(RankingMode::Bm25, queries)?;
    let vector_space = model.evaluate(RankingMode::VectorSpace, queries)?;
    let latent_semantic = match model.factors() {
        Ok(_) => Some(model.evaluate(RankingMode::LatentSemantic, queries)?),
        Err(engine::Error::LatentFactorsUnavailable) => None,
        Err(err) => {
            tracing::warn!(error = %err, "skipping latent-semantic metrics");
            None
        }
    };
    let lambda = model.config().blend_lambda;
    let blended = latent_semantic.as_ref().map(|lsi| vector_space.blend(lsi, lambda)).transpose()?;
    tracing::info!(queries = queries.len(), "benchmark complete");
    Ok(BenchmarkReport {
        generated_at: now_rfc3339(),
        num_docs: model.num_docs(),
        num_queries: queries.len(),
        bm25,
        vector_space,
        latent_semantic,
        lambda,
        blended,
    })
}

#[derive(Debug, Serialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub members: Vec<DocId>,
    pub top_terms: Vec<TermWeight>,
}

#[derive(Debug, Serialize)]
pub struct ClusterReport {
    pub generated_at: String,
    pub iterations: usize,
    pub converged: bool,
    pub rss: f64,
    pub rss_history: Vec<f64>,
    pub clusters: Vec<ClusterSummary>,
}

pub fn cluster_report(model: &SearchModel, top_terms: usize) -> Result<ClusterReport> {
    let clustering = model.cluster()?;
    let terms = clustering.top_terms(model.matrix().terms(), top_terms);
    let clusters = clustering
        .members()
        .into_iter()
        .zip(terms)
        .enumerate()
        .map(|(cluster, (members, top))| ClusterSummary {
            cluster,
            size: members.len(),
            members,
            top_terms: top.into_iter().map(|(term, weight)| TermWeight { term, weight }).collect(),
        })
        .collect();
    Ok(ClusterReport {
        generated_at: now_rfc3339(),
        iterations: clustering.iterations,
        converged: clustering.converged,
        rss: clustering.rss,
        rss_history: clustering.rss_history,
        clusters,
    })
}

pub fn related_terms(model: &SearchModel, count: usize) -> Result<Vec<RelatedPair>> {
    Ok(model.related_terms(count)?)
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into())
}
