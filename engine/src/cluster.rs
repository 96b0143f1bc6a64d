use crate::config::{EmptyClusterPolicy, KMeansConfig};
use crate::error::{Error, Result};
use crate::index::DocId;
use crate::matrix::TermDocumentMatrix;
use ndarray::Array2;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KMeansState {
    Initialized,
    Iterating,
    Converged,
}

/// Spherical k-means over the document columns. Distance is `1 - cos(d, c)`
/// and RSS sums each document's distance to its centroid. The caller's `Rng`
/// is the only source of randomness.
#[derive(Debug, Clone)]
pub struct KMeans {
    config: KMeansConfig,
    /// Unit-length document columns as sparse `(row, value)` entries.
    docs: Vec<Vec<(usize, f64)>>,
    /// One column per cluster.
    centroids: Array2<f64>,
    assignment: Vec<usize>,
    previous_rss: f64,
    rss: f64,
    rss_history: Vec<f64>,
    iterations: usize,
    state: KMeansState,
}

/// Terminal output of a k-means run.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Term space x clusters, unit-length columns.
    pub centroids: Array2<f64>,
    /// Cluster index per document column.
    pub assignment: Vec<usize>,
    pub iterations: usize,
    pub rss: f64,
    pub rss_history: Vec<f64>,
    pub converged: bool,
}

impl KMeans {
    /// Seeds the centroids with `config.clusters` distinct documents drawn uniformly.
    pub fn init<R: Rng + ?Sized>(matrix: &TermDocumentMatrix, config: &KMeansConfig, rng: &mut R) -> Result<Self> {
        let (k, n) = (config.clusters, matrix.num_docs());
        if k == 0 || k > n {
            return Err(Error::InvalidClusterCount { clusters: k, documents: n });
        }
        let picks: Vec<DocId> = rand::seq::index::sample(rng, n, k).into_iter().map(|col| col as DocId + 1).collect();
        Self::with_seeds(matrix, config, &picks)
    }

    /// Seeds the centroids with the given documents, one per cluster.
    pub fn with_seeds(matrix: &TermDocumentMatrix, config: &KMeansConfig, seeds: &[DocId]) -> Result<Self> {
        let n = matrix.num_docs();
        if seeds.is_empty() || seeds.len() > n || seeds.iter().any(|&d| d == 0 || d as usize > n) {
            return Err(Error::InvalidClusterCount { clusters: seeds.len(), documents: n });
        }
        let docs = matrix.normalize_columns().columns();
        let mut centroids = Array2::zeros((matrix.num_rows(), seeds.len()));
        for (c, &doc_id) in seeds.iter().enumerate() {
            for &(row, v) in &docs[doc_id as usize - 1] {
                centroids[[row, c]] = v;
            }
        }
        tracing::debug!(clusters = seeds.len(), ?seeds, "initialized centroids");
        Ok(Self {
            config: KMeansConfig { clusters: seeds.len(), ..config.clone() },
            docs,
            centroids,
            assignment: vec![0; n],
            previous_rss: f64::MAX,
            rss: f64::MAX,
            rss_history: Vec::new(),
            iterations: 0,
            state: KMeansState::Initialized,
        })
    }

    pub fn state(&self) -> KMeansState { self.state }
    pub fn iterations(&self) -> usize { self.iterations }
    pub fn rss(&self) -> f64 { self.rss }

    /// One round of normalize, assign, recompute.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<KMeansState> {
        if self.state == KMeansState::Converged {
            return Ok(self.state);
        }
        normalize_columns(&mut self.centroids);

        let k = self.centroids.ncols();
        let mut rss = 0.0;
        for (doc, slot) in self.docs.iter().zip(self.assignment.iter_mut()) {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for c in 0..k {
                let sim: f64 = doc.iter().map(|&(row, v)| v * self.centroids[[row, c]]).sum();
                let distance = 1.0 - sim;
                if distance < best_distance {
                    best = c;
                    best_distance = distance;
                }
            }
            *slot = best;
            rss += best_distance;
        }

        self.iterations += 1;
        self.recompute_centroids(rng)?;
        self.rss = rss;
        self.rss_history.push(rss);
        tracing::debug!(iteration = self.iterations, rss, "k-means iteration");

        self.state = if self.previous_rss - rss < self.config.epsilon {
            KMeansState::Converged
        } else {
            KMeansState::Iterating
        };
        self.previous_rss = rss;
        Ok(self.state)
    }

    fn recompute_centroids<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let k = self.centroids.ncols();
        let mut sums = Array2::<f64>::zeros(self.centroids.raw_dim());
        let mut counts = vec![0usize; k];
        for (doc, &c) in self.docs.iter().zip(&self.assignment) {
            for &(row, v) in doc {
                sums[[row, c]] += v;
            }
            counts[c] += 1;
        }
        for (c, &count) in counts.iter().enumerate() {
            if count > 0 {
                let mut col = sums.column_mut(c);
                col /= count as f64;
                continue;
            }
            match self.config.empty_cluster {
                EmptyClusterPolicy::Fail => return Err(Error::EmptyCluster { cluster: c, iteration: self.iterations }),
                EmptyClusterPolicy::KeepPrevious => sums.column_mut(c).assign(&self.centroids.column(c)),
                EmptyClusterPolicy::Reseed => {
                    let pick = rng.random_range(0..self.docs.len());
                    for &(row, v) in &self.docs[pick] {
                        sums[[row, c]] = v;
                    }
                }
            }
            tracing::warn!(cluster = c, iteration = self.iterations, policy = ?self.config.empty_cluster, "empty cluster");
        }
        self.centroids = sums;
        Ok(())
    }

    /// Iterates until RSS stops decreasing by at least `epsilon`, or the
    /// iteration cap is hit.
    pub fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> Result<Clustering> {
        while self.state != KMeansState::Converged && self.iterations < self.config.max_iterations {
            self.step(rng)?;
        }
        let converged = self.state == KMeansState::Converged;
        if converged {
            tracing::info!(iterations = self.iterations, rss = self.rss, "k-means converged");
        } else {
            tracing::warn!(iterations = self.iterations, rss = self.rss, "k-means stopped at iteration cap");
        }
        normalize_columns(&mut self.centroids);
        Ok(Clustering {
            centroids: self.centroids,
            assignment: self.assignment,
            iterations: self.iterations,
            rss: self.rss,
            rss_history: self.rss_history,
            converged,
        })
    }
}

fn normalize_columns(m: &mut Array2<f64>) {
    for mut col in m.columns_mut() {
        let norm = col.dot(&col).sqrt();
        if norm > 0.0 {
            col /= norm;
        }
    }
}

impl Clustering {
    pub fn num_clusters(&self) -> usize { self.centroids.ncols() }

    /// Document ids per cluster, ascending.
    pub fn members(&self) -> Vec<Vec<DocId>> {
        let mut out = vec![Vec::new(); self.num_clusters()];
        for (col, &c) in self.assignment.iter().enumerate() {
            out[c].push(col as DocId + 1);
        }
        out
    }

    /// The `n` heaviest terms of each centroid.
    pub fn top_terms(&self, terms: &[String], n: usize) -> Vec<Vec<(String, f64)>> {
        self.centroids
            .columns()
            .into_iter()
            .map(|col| {
                let mut weighted: Vec<(usize, f64)> = col.iter().copied().enumerate().filter(|&(_, w)| w > 0.0).collect();
                weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
                weighted.into_iter().take(n).map(|(row, w)| (terms[row].clone(), w)).collect()
            })
            .collect()
    }
}
