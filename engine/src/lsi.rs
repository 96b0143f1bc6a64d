use crate::config::LsiConfig;
use crate::error::{Error, Result};
use crate::matrix::TermDocumentMatrix;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::Serialize;
use std::cmp::Ordering;

/// Eigenvalues of `AᵗA` below this fraction of the largest count as zero.
const RANK_EPSILON: f64 = 1e-12;
/// Extra block vectors carried past the requested rank.
const MIN_OVERSAMPLE: usize = 8;
/// A block column shorter than this fraction of the longest has collapsed.
const COLLAPSE: f64 = 1e-14;
const JACOBI_SWEEPS: usize = 64;
const GOLDEN: f64 = 0.618_033_988_749_895;

#[derive(Debug, Clone)]
pub struct LatentFactors {
    terms: Vec<String>,
    u_k: Array2<f64>,
    sigma: Array1<f64>,
    v_k: Array2<f64>,
    us_k: Array2<f64>,
    iterations: usize,
    converged: bool,
    config: LsiConfig,
}

/// Two vocabulary terms that lie close together in latent space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedPair {
    pub score: f64,
    pub first: String,
    pub second: String,
}

impl LatentFactors {
    /// Rank-k truncated SVD. Singular vector signs are fixed so the
    /// largest-magnitude component of each left vector is positive.
    pub fn compute(matrix: &TermDocumentMatrix, config: &LsiConfig) -> Result<Self> {
        let (m, n) = (matrix.num_rows(), matrix.num_docs());
        let rank = config.rank;
        let max = m.min(n);
        if rank == 0 || rank >= max {
            return Err(Error::InvalidRank { rank, max });
        }

        let block = (rank + rank.max(MIN_OVERSAMPLE)).min(max);
        let ritz = subspace_iteration(matrix, rank, block, config);
        if !ritz.converged {
            tracing::warn!(iterations = ritz.iterations, tolerance = config.tolerance, "latent factors stopped at iteration cap before converging");
        }

        let largest = ritz.values[0].max(0.0);
        for (i, &lambda) in ritz.values.iter().take(rank).enumerate() {
            if largest == 0.0 || lambda <= RANK_EPSILON * largest {
                return Err(Error::RankDeficient { rank, index: i });
            }
        }
        let sigma: Array1<f64> = ritz.values.iter().take(rank).map(|l| l.sqrt()).collect();
        let mut v = ritz.vectors.slice(s![.., ..rank]).to_owned();
        let mut u = matrix.multiply_block(&v);
        for i in 0..rank {
            let mut col = u.column_mut(i);
            col /= sigma[i];
            if sign_pivot(col.view()) < 0.0 {
                col.mapv_inplace(|x| -x);
                v.column_mut(i).mapv_inplace(|x| -x);
            }
        }
        let us_k = &u * &sigma;
        tracing::info!(rank, terms = m, docs = n, iterations = ritz.iterations, sigma = ?sigma.to_vec(), "computed latent factors");
        Ok(Self {
            terms: matrix.terms().to_vec(),
            u_k: u,
            sigma,
            v_k: v.reversed_axes(),
            us_k,
            iterations: ritz.iterations,
            converged: ritz.converged,
            config: config.clone(),
        })
    }

    pub fn rank(&self) -> usize { self.sigma.len() }
    pub fn config(&self) -> &LsiConfig { &self.config }
    pub fn u_k(&self) -> &Array2<f64> { &self.u_k }
    pub fn sigma(&self) -> &Array1<f64> { &self.sigma }
    pub fn v_k(&self) -> &Array2<f64> { &self.v_k }
    pub fn us_k(&self) -> &Array2<f64> { &self.us_k }
    pub fn iterations(&self) -> usize { self.iterations }
    /// False when the iteration cap was reached first.
    pub fn converged(&self) -> bool { self.converged }

    /// Scores every document against a sparse query over the matrix rows:
    /// `(q · U_kΣ_k) · V_k`.
    pub fn project(&self, query: &[(usize, f64)]) -> Array1<f64> {
        let mut latent = Array1::<f64>::zeros(self.rank());
        for &(row, weight) in query {
            latent.scaled_add(weight, &self.us_k.row(row));
        }
        latent.dot(&self.v_k)
    }

    /// `U_k · U_kᵗ`, the term-term similarity in latent space.
    pub fn term_similarity(&self) -> Array2<f64> { self.u_k.dot(&self.u_k.t()) }

    /// The `count` best-scoring distinct term pairs. Pairs whose score equals
    /// one already reported are skipped.
    pub fn related_term_pairs(&self, count: usize) -> Vec<RelatedPair> {
        let t = self.term_similarity();
        let n = t.nrows();
        let mut candidates: Vec<(f64, usize, usize)> = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                candidates.push((t[[i, j]], i, j));
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut out: Vec<RelatedPair> = Vec::with_capacity(count);
        for (score, i, j) in candidates {
            if out.len() >= count { break; }
            if out.last().is_some_and(|last| approx_eq(last.score, score)) { continue; }
            out.push(RelatedPair { score, first: self.terms[i].clone(), second: self.terms[j].clone() });
        }
        out
    }
}

fn approx_eq(a: f64, b: f64) -> bool { (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0) }

struct Ritz {
    /// Descending.
    values: Vec<f64>,
    /// Documents x block, one Ritz vector per column.
    vectors: Array2<f64>,
    iterations: usize,
    converged: bool,
}

/// Block subspace iteration on `AᵗA` with Rayleigh-Ritz extraction. Only
/// sparse products `Aᵗ(A·X)` touch the matrix. Stops once every wanted Ritz
/// pair has residual `‖AᵗA·x - θx‖` within `tolerance` of the largest `θ`.
fn subspace_iteration(matrix: &TermDocumentMatrix, rank: usize, block: usize, config: &LsiConfig) -> Ritz {
    let n = matrix.num_docs();
    let max_iterations = config.max_iterations.max(1);
    let mut x = Array2::from_shape_fn((n, block), |(j, c)| start_value(j, c));
    orthonormalize(&mut x);
    let mut iteration = 0;
    loop {
        iteration += 1;
        let z = matrix.transpose_multiply_block(&matrix.multiply_block(&x));
        let h = x.t().dot(&z);
        let h = (&h + &h.t()) * 0.5;
        let (values, w) = symmetric_eigen(h);
        let xr = x.dot(&w);
        let zr = z.dot(&w);

        let limit = config.tolerance * values[0].max(0.0);
        let converged = (0..rank).all(|i| {
            let r = &zr.column(i) - &(&xr.column(i) * values[i]);
            r.dot(&r).sqrt() <= limit
        });
        if converged || iteration >= max_iterations {
            tracing::debug!(iterations = iteration, converged, "subspace iteration finished");
            return Ritz { values, vectors: xr, iterations: iteration, converged };
        }
        x = zr;
        orthonormalize(&mut x);
    }
}

fn start_value(j: usize, c: usize) -> f64 { 1.0 + ((j + 1) as f64 * GOLDEN * (c + 1) as f64).fract() }

/// Modified Gram-Schmidt with one reorthogonalization pass. A column that
/// collapses onto the ones before it is replaced by a fresh start vector.
fn orthonormalize(x: &mut Array2<f64>) {
    let (n, p) = x.dim();
    let scale = x.columns().into_iter().map(|c| c.dot(&c).sqrt()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);
    for j in 0..p {
        let mut col = x.column(j).to_owned();
        project_out(&mut col, x, j);
        let mut norm = col.dot(&col).sqrt();
        if norm <= COLLAPSE * scale {
            let refill = (0..n).find_map(|attempt| {
                let mut fresh = Array1::from_shape_fn(n, |i| start_value(i, p + j + attempt));
                fresh /= fresh.dot(&fresh).sqrt();
                project_out(&mut fresh, x, j);
                let fresh_norm = fresh.dot(&fresh).sqrt();
                (fresh_norm > 1e-8).then_some((fresh, fresh_norm))
            });
            match refill {
                Some((fresh, fresh_norm)) => {
                    col = fresh;
                    norm = fresh_norm;
                }
                None => {
                    x.column_mut(j).fill(0.0);
                    continue;
                }
            }
        }
        x.column_mut(j).assign(&(col / norm));
    }
}

fn project_out(v: &mut Array1<f64>, basis: &Array2<f64>, upto: usize) {
    for _ in 0..2 {
        for q in basis.columns().into_iter().take(upto) {
            let d = v.dot(&q);
            v.scaled_add(-d, &q);
        }
    }
}

/// Cyclic Jacobi on a small symmetric matrix. Eigenvalues descending, with
/// the matching eigenvectors as columns.
fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);
    for _ in 0..JACOBI_SWEEPS {
        let total: f64 = a.iter().map(|x| x * x).sum();
        let diag: f64 = a.diag().iter().map(|x| x * x).sum();
        if total - diag <= 1e-30 * total.max(f64::MIN_POSITIVE) {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate_columns(&mut a, p, q, c, s);
                rotate_rows(&mut a, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));
    let values = order.iter().map(|&i| a[[i, i]]).collect();
    (values, v.select(Axis(1), &order))
}

fn rotate_columns(m: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..m.nrows() {
        let (mp, mq) = (m[[k, p]], m[[k, q]]);
        m[[k, p]] = c * mp - s * mq;
        m[[k, q]] = s * mp + c * mq;
    }
}

fn rotate_rows(m: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..m.ncols() {
        let (mp, mq) = (m[[p, k]], m[[q, k]]);
        m[[p, k]] = c * mp - s * mq;
        m[[q, k]] = s * mp + c * mq;
    }
}

fn sign_pivot(v: ArrayView1<f64>) -> f64 {
    v.iter()
        .copied()
        .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Equal))
        .unwrap_or(0.0)
}
