use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    // Input
    #[error("collection contains no documents")]
    EmptyCollection,
    #[error("malformed benchmark line {line}: {reason}")]
    MalformedBenchmarkLine { line: usize, reason: String },
    #[error("relevance judgment has no relevant documents")]
    EmptyRelevantSet,
    #[error("benchmark contains no queries")]
    EmptyBenchmark,

    // Numeric degeneracy
    #[error("term '{term}' has zero document frequency")]
    ZeroDocumentFrequency { term: String },
    #[error("latent rank {rank} must be in 1..{max}")]
    InvalidRank { rank: usize, max: usize },
    #[error("matrix rank is below the requested latent rank {rank} (singular value {index} vanishes)")]
    RankDeficient { rank: usize, index: usize },
    #[error("cluster {cluster} has no documents at iteration {iteration}")]
    EmptyCluster { cluster: usize, iteration: usize },

    // Configuration
    #[error("invalid config {origin}: {reason}")]
    Config { origin: String, reason: String },
    #[error("{what} requires k > 0")]
    ZeroK { what: &'static str },
    #[error("cannot form {clusters} clusters from {documents} documents")]
    InvalidClusterCount { clusters: usize, documents: usize },
    #[error("blend weight {0} is outside [0, 1]")]
    InvalidBlend(f64),
    #[error("latent-semantic ranking needs an lsi rank; none was configured")]
    LatentFactorsUnavailable,
    #[error("invalid value {value} for {name}")]
    InvalidParameter { name: &'static str, value: f64 },
}
