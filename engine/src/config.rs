use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization strength in [0, 1].
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.75, b: 0.75 } }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Keep only the `m` terms with the highest document frequency.
    pub max_terms: Option<usize>,
    pub l2_normalize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsiConfig {
    /// Number of singular values retained.
    pub rank: usize,
    /// Latent scores are rounded to this many decimals before filtering and tie-breaking.
    pub score_decimals: u32,
    pub max_iterations: usize,
    /// Ritz residual bound, relative to the largest eigenvalue of `AᵗA`.
    pub tolerance: f64,
}

impl Default for LsiConfig {
    fn default() -> Self { Self { rank: 2, score_decimals: 3, max_iterations: 1_000, tolerance: 1e-10 } }
}

/// What k-means does when a centroid loses all of its documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyClusterPolicy {
    /// Keep the centroid from the previous iteration.
    #[default]
    KeepPrevious,
    /// Move the centroid onto a randomly drawn document.
    Reseed,
    /// Abort with [`Error::EmptyCluster`].
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub clusters: usize,
    /// Stop once RSS decreases by less than this between iterations.
    pub epsilon: f64,
    pub max_iterations: usize,
    pub seed: Option<u64>,
    pub empty_cluster: EmptyClusterPolicy,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self { clusters: 2, epsilon: 1e-4, max_iterations: 100, seed: None, empty_cluster: EmptyClusterPolicy::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Tokens shorter than this (in chars) are dropped.
    pub min_len: usize,
    pub nfkc: bool,
    pub stopwords: bool,
    pub stem: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self { Self { min_len: 1, nfkc: true, stopwords: false, stem: false } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tokenizer: TokenizerConfig,
    pub bm25: Bm25Params,
    pub matrix: MatrixConfig,
    /// `None` skips the SVD entirely.
    pub lsi: Option<LsiConfig>,
    pub kmeans: KMeansConfig,
    /// Weight of the vector-space metrics when blending with latent-semantic ones.
    pub blend_lambda: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tokenizer: TokenizerConfig::default(),
            bm25: Bm25Params::default(),
            matrix: MatrixConfig::default(),
            lsi: Some(LsiConfig::default()),
            kmeans: KMeansConfig::default(),
            blend_lambda: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Config { origin: "string".into(), reason: e.to_string() })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config { origin: origin.clone(), reason: e.to_string() })?;
        serde_json::from_str(&text).map_err(|e| Error::Config { origin, reason: e.to_string() })
    }

    pub fn validate(&self) -> Result<()> {
        if self.bm25.k1.is_nan() || self.bm25.k1 < 0.0 {
            return Err(Error::InvalidParameter { name: "bm25.k1", value: self.bm25.k1 });
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(Error::InvalidParameter { name: "bm25.b", value: self.bm25.b });
        }
        if !(0.0..=1.0).contains(&self.blend_lambda) {
            return Err(Error::InvalidBlend(self.blend_lambda));
        }
        if self.matrix.max_terms == Some(0) {
            return Err(Error::ZeroK { what: "matrix.max_terms" });
        }
        if let Some(lsi) = &self.lsi {
            if lsi.rank == 0 {
                return Err(Error::ZeroK { what: "lsi.rank" });
            }
        }
        if self.kmeans.clusters == 0 {
            return Err(Error::ZeroK { what: "kmeans.clusters" });
        }
        if self.kmeans.epsilon.is_nan() || self.kmeans.epsilon < 0.0 {
            return Err(Error::InvalidParameter { name: "kmeans.epsilon", value: self.kmeans.epsilon });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"bm25": {"k1": 1.2}, "kmeans": {"clusters": 5, "empty_cluster": "reseed"}}"#).unwrap();
        assert_eq!(cfg.bm25.k1, 1.2);
        assert_eq!(cfg.bm25.b, 0.75);
        assert_eq!(cfg.kmeans.clusters, 5);
        assert_eq!(cfg.kmeans.empty_cluster, EmptyClusterPolicy::Reseed);
        assert_eq!(cfg.lsi.as_ref().map(|l| l.rank), Some(2));
        cfg.validate().unwrap();
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"lsi": null, "matrix": {"max_terms": 500, "l2_normalize": true}}"#).unwrap();
        let cfg = EngineConfig::from_json_file(&path).unwrap();
        assert!(cfg.lsi.is_none());
        assert_eq!(cfg.matrix, MatrixConfig { max_terms: Some(500), l2_normalize: true });

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(EngineConfig::from_json_file(&path), Err(Error::Config { origin, .. }) if origin == path.display().to_string()));
        let missing = dir.path().join("missing.json");
        assert!(matches!(EngineConfig::from_json_file(&missing), Err(Error::Config { .. })));
        assert!(matches!(EngineConfig::from_json_str(r#"{"bm25": {"k1": "high"}}"#), Err(Error::Config { .. })));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = EngineConfig::default();
        cfg.bm25.b = 1.5;
        assert!(matches!(cfg.validate(), Err(Error::InvalidParameter { name: "bm25.b", .. })));

        let mut cfg = EngineConfig::default();
        cfg.blend_lambda = -0.1;
        assert_eq!(cfg.validate(), Err(Error::InvalidBlend(-0.1)));

        let mut cfg = EngineConfig::default();
        cfg.bm25.k1 = f64::NAN;
        assert!(matches!(cfg.validate(), Err(Error::InvalidParameter { name: "bm25.k1", .. })));

        let mut cfg = EngineConfig::default();
        cfg.kmeans.clusters = 0;
        assert_eq!(cfg.validate(), Err(Error::ZeroK { what: "kmeans.clusters" }));
    }
}
