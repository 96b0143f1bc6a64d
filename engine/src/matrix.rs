use crate::config::MatrixConfig;
use crate::index::{DocId, PostingEntry, TermId, TermLists};
use ndarray::Array2;
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TermDocumentMatrix {
    terms: Vec<String>,
    rows_by_term: HashMap<String, usize>,
    num_docs: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl TermDocumentMatrix {
    /// Rows follow first occurrence. With `max_terms` they are the `m` terms
    /// of highest document frequency, ties kept in first-occurrence order.
    /// Column `j` is document `j + 1`.
    pub fn build<L: TermLists>(lists: &L, config: &MatrixConfig) -> Self {
        let mut order: Vec<TermId> = (0..lists.terms().len() as TermId).collect();
        if let Some(m) = config.max_terms {
            // stable: equal frequencies stay in first-occurrence order
            order.sort_by_key(|&tid| Reverse(lists.postings(tid).len()));
            order.truncate(m);
        }

        let mut terms = Vec::with_capacity(order.len());
        let mut indptr = Vec::with_capacity(order.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for tid in order {
            terms.push(lists.terms()[tid as usize].clone());
            for p in lists.postings(tid) {
                indices.push((p.doc_id() - 1) as usize);
                data.push(p.value());
            }
            indptr.push(indices.len());
        }
        let rows_by_term = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        let matrix = Self { terms, rows_by_term, num_docs: lists.num_docs() as usize, indptr, indices, data };
        let matrix = if config.l2_normalize { matrix.normalize_columns() } else { matrix };
        tracing::info!(rows = matrix.num_rows(), cols = matrix.num_docs, nnz = matrix.nnz(), l2 = config.l2_normalize, "built term-document matrix");
        matrix
    }

    /// Builds a matrix straight from rows of `(doc_id, value)` pairs.
    pub fn from_rows<S: Into<String>>(rows: Vec<(S, Vec<(DocId, f64)>)>, num_docs: usize) -> Self {
        let mut terms = Vec::with_capacity(rows.len());
        let mut indptr = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for (term, entries) in rows {
            terms.push(term.into());
            for (doc_id, value) in entries {
                indices.push((doc_id - 1) as usize);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        let rows_by_term = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Self { terms, rows_by_term, num_docs, indptr, indices, data }
    }

    pub fn num_rows(&self) -> usize { self.terms.len() }
    pub fn num_docs(&self) -> usize { self.num_docs }
    pub fn nnz(&self) -> usize { self.data.len() }
    pub fn terms(&self) -> &[String] { &self.terms }
    pub fn row_of(&self, term: &str) -> Option<usize> { self.rows_by_term.get(term).copied() }

    /// Non-zero `(column, value)` entries of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.indptr[row]..self.indptr[row + 1];
        self.indices[span.clone()].iter().copied().zip(self.data[span].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.row(row).find(|&(c, _)| c == col).map(|(_, v)| v).unwrap_or(0.0)
    }

    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.num_docs];
        for (&col, &v) in self.indices.iter().zip(&self.data) {
            sums[col] += v;
        }
        sums
    }

    /// Euclidean column norms; an all-zero column reports 1.
    pub fn column_norms(&self) -> Vec<f64> {
        let mut norms = vec![0.0; self.num_docs];
        for (&col, &v) in self.indices.iter().zip(&self.data) {
            norms[col] += v * v;
        }
        for n in norms.iter_mut() {
            *n = n.sqrt();
            if *n == 0.0 { *n = 1.0; }
        }
        norms
    }

    /// Copy with every column scaled to unit length. Empty columns stay zero.
    pub fn normalize_columns(&self) -> Self {
        let norms = self.column_norms();
        let data = self.indices.iter().zip(&self.data).map(|(&col, &v)| v / norms[col]).collect();
        Self { data, ..self.clone() }
    }

    /// `q · A` for a sparse row vector `q` given as `(row, weight)` pairs.
    pub fn left_multiply(&self, query: &[(usize, f64)]) -> Vec<f64> {
        let mut scores = vec![0.0; self.num_docs];
        for &(row, weight) in query {
            for (col, v) in self.row(row) {
                scores[col] += weight * v;
            }
        }
        scores
    }

    /// `A · X`, with one row of `x` per document.
    pub fn multiply_block(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.num_rows(), x.ncols()));
        for r in 0..self.num_rows() {
            let mut dst = out.row_mut(r);
            for (col, v) in self.row(r) {
                dst.scaled_add(v, &x.row(col));
            }
        }
        out
    }

    /// `Aᵗ · Y`, with one row of `y` per term.
    pub fn transpose_multiply_block(&self, y: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.num_docs, y.ncols()));
        for r in 0..self.num_rows() {
            let src = y.row(r);
            for (col, v) in self.row(r) {
                out.row_mut(col).scaled_add(v, &src);
            }
        }
        out
    }

    /// Non-zero `(row, value)` entries of every document column, rows ascending.
    pub fn columns(&self) -> Vec<Vec<(usize, f64)>> {
        let mut cols = vec![Vec::new(); self.num_docs];
        for r in 0..self.num_rows() {
            for (col, v) in self.row(r) {
                cols[col].push((r, v));
            }
        }
        cols
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.num_rows(), self.num_docs));
        for row in 0..self.num_rows() {
            for (col, v) in self.row(row) {
                dense[[row, col]] = v;
            }
        }
        dense
    }
}
