use crate::bm25::WeightedIndex;
use crate::error::{Error, Result};
use crate::index::{DocId, Posting};
use crate::lsi::LatentFactors;
use crate::matrix::TermDocumentMatrix;
use crate::postings;
use crate::select::top_k;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f64,
}

impl From<Posting> for Hit {
    fn from(p: Posting) -> Self { Self { doc_id: p.doc_id, score: p.weight } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Merge the BM25 posting lists and select the top k.
    Bm25,
    /// Dot product against the term-document matrix.
    VectorSpace,
    /// Dot product in the rank-k latent space.
    LatentSemantic,
}

pub struct QueryEngine<'a> {
    index: &'a WeightedIndex,
    matrix: &'a TermDocumentMatrix,
    factors: Option<&'a LatentFactors>,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a WeightedIndex, matrix: &'a TermDocumentMatrix, factors: Option<&'a LatentFactors>) -> Self {
        Self { index, matrix, factors }
    }

    /// Sparse query vector over the matrix rows: one unit per occurrence of
    /// each known term, sorted by row. Unknown terms are skipped.
    pub fn query_vector<S: AsRef<str>>(&self, terms: &[S]) -> Vec<(usize, f64)> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms {
            if let Some(row) = self.matrix.row_of(term.as_ref()) {
                *counts.entry(row).or_insert(0.0) += 1.0;
            }
        }
        counts.into_iter().collect()
    }

    /// Documents with a positive score, best first; equal scores keep
    /// ascending document order.
    pub fn search_vsm<S: AsRef<str>>(&self, terms: &[S]) -> Vec<Hit> {
        let q = self.query_vector(terms);
        if q.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Hit> = self
            .matrix
            .left_multiply(&q)
            .into_iter()
            .enumerate()
            .filter(|&(_, s)| s > 0.0)
            .map(|(col, score)| Hit { doc_id: col as DocId + 1, score })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits
    }

    /// Documents with a non-negative latent score, best first; equal scores
    /// are ordered by descending document id. Scores are rounded to the
    /// configured number of decimals first.
    pub fn search_lsi<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<Hit>> {
        let factors = self.factors.ok_or(Error::LatentFactorsUnavailable)?;
        let q = self.query_vector(terms);
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let decimals = factors.config().score_decimals;
        let mut hits: Vec<Hit> = factors
            .project(&q)
            .iter()
            .enumerate()
            .map(|(col, &s)| Hit { doc_id: col as DocId + 1, score: round_to(s, decimals) })
            .filter(|h| h.score >= 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(b.doc_id.cmp(&a.doc_id)));
        Ok(hits)
    }

    /// Union of the BM25 lists of every query term occurrence, top `k` by
    /// summed weight. Ties keep ascending document order.
    pub fn search_bm25<S: AsRef<str>>(&self, terms: &[S], k: usize) -> Result<Vec<Hit>> {
        if k == 0 {
            return Err(Error::ZeroK { what: "bm25 search" });
        }
        let merged = postings::merge_all(terms.iter().filter_map(|t| self.index.get(t.as_ref())));
        Ok(top_k(merged, k)?.into_iter().map(Hit::from).collect())
    }

    /// Documents containing every query term, ascending by id, with summed weights.
    pub fn search_boolean<S: AsRef<str>>(&self, terms: &[S]) -> Vec<Hit> {
        let mut lists = Vec::with_capacity(terms.len());
        for term in terms {
            match self.index.get(term.as_ref()) {
                Some(list) => lists.push(list),
                None => return Vec::new(),
            }
        }
        postings::intersect_all(lists).into_iter().map(Hit::from).collect()
    }

    /// Ranked search in the given mode, cut to `limit` hits when given.
    /// `Some(0)` is an empty result in every mode.
    pub fn search<S: AsRef<str>>(&self, mode: RankingMode, terms: &[S], limit: Option<usize>) -> Result<Vec<Hit>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let mut hits = match mode {
            RankingMode::Bm25 => {
                let k = limit.unwrap_or(self.index.stats.num_docs as usize);
                self.search_bm25(terms, k)?
            }
            RankingMode::VectorSpace => self.search_vsm(terms),
            RankingMode::LatentSemantic => self.search_lsi(terms)?,
        };
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        tracing::debug!(?mode, terms = terms.len(), hits = hits.len(), "ranked query");
        Ok(hits)
    }
}

fn round_to(x: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    // `+ 0.0` folds -0.0 into 0.0
    (x * scale).round() / scale + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bm25Params, LsiConfig, MatrixConfig};
    use crate::index::InvertedIndex;

    struct Fixture {
        index: WeightedIndex,
        matrix: TermDocumentMatrix,
        factors: LatentFactors,
    }

    fn fixture() -> Fixture {
        let raw = InvertedIndex::from_documents(vec![
            vec!["internet", "web", "surfing"],
            vec!["internet", "surfing"],
            vec!["web", "surfing"],
            vec!["internet", "web", "surfing", "surfing", "beach"],
            vec!["surfing", "beach"],
            vec!["surfing", "beach"],
        ])
        .unwrap();
        let index = Bm25Params { k1: 1.75, b: 0.75 }.weigh(&raw).unwrap();
        let matrix = TermDocumentMatrix::build(&index, &MatrixConfig { max_terms: Some(4), l2_normalize: false });
        let factors = LatentFactors::compute(&matrix, &LsiConfig { rank: 2, ..Default::default() }).unwrap();
        Fixture { index, matrix, factors }
    }

    fn rounded(hits: &[Hit]) -> Vec<(DocId, f64)> { hits.iter().map(|h| (h.doc_id, round_to(h.score, 3))).collect() }

    #[test]
    fn vector_space_ranking() {
        let f = fixture();
        let engine = QueryEngine::new(&f.index, &f.matrix, Some(&f.factors));
        let hits = engine.search_vsm(&["web", "surfing"]);
        assert_eq!(rounded(&hits), vec![(3, 1.135), (1, 0.944), (4, 0.705)]);
    }

    #[test]
    fn repeated_terms_scale_scores() {
        let index = Bm25Params::default().weigh(&InvertedIndex::from_documents(vec![vec!["x"]]).unwrap()).unwrap();
        let matrix = TermDocumentMatrix::from_rows(vec![("bla", vec![(1, 0.2), (3, 0.6)]), ("blubb", vec![(2, 0.4), (3, 0.1), (4, 0.8)])], 4);
        let engine = QueryEngine::new(&index, &matrix, None);
        assert_eq!(rounded(&engine.search_vsm(&["bla", "blubb"])), vec![(4, 0.8), (3, 0.7), (2, 0.4), (1, 0.2)]);
        assert_eq!(rounded(&engine.search_vsm(&["bla", "blubb", "bla", "blubb"])), vec![(4, 1.6), (3, 1.4), (2, 0.8), (1, 0.4)]);
        assert!(engine.search_vsm(&["nothing"]).is_empty());
        assert_eq!(engine.search_lsi(&["bla"]), Err(Error::LatentFactorsUnavailable));
    }

    #[test]
    fn vector_space_ties_keep_ascending_ids() {
        let index = Bm25Params::default().weigh(&InvertedIndex::from_documents(vec![vec!["x"]]).unwrap()).unwrap();
        let matrix = TermDocumentMatrix::from_rows(vec![("a", vec![(1, 0.5), (2, 0.5), (3, 0.9)]), ("b", vec![(2, 0.3), (4, 0.3)])], 4);
        let engine = QueryEngine::new(&index, &matrix, None);
        let ids = |hits: Vec<Hit>| hits.into_iter().map(|h| h.doc_id).collect::<Vec<_>>();
        assert_eq!(ids(engine.search_vsm(&["a"])), vec![3, 1, 2]);
        assert_eq!(ids(engine.search_vsm(&["b"])), vec![2, 4]);
    }

    #[test]
    fn latent_semantic_ranking() {
        let f = fixture();
        let engine = QueryEngine::new(&f.index, &f.matrix, Some(&f.factors));
        let hits = engine.search_lsi(&["web", "surfing"]).unwrap();
        assert_eq!(rounded(&hits), vec![(1, 0.944), (4, 0.705), (3, 0.568), (2, 0.568), (6, 0.0), (5, 0.0)]);
    }

    #[test]
    fn bm25_ranked_merge() {
        let raw = InvertedIndex::from_documents(vec![vec!["first", "docum"], vec!["second", "docum"], vec!["third", "docum"]]).unwrap();
        let index = Bm25Params::default().weigh(&raw).unwrap();
        let matrix = TermDocumentMatrix::build(&index, &MatrixConfig::default());
        let engine = QueryEngine::new(&index, &matrix, None);
        let hits = engine.search_bm25(&["docum", "third"], 3).unwrap();
        let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!((hits[0].score - 3f64.log2()).abs() < 1e-12);
        assert_eq!(hits[1].score, 0.0);
        assert!(engine.search_bm25(&["missing"], 3).unwrap().is_empty());
        assert!(matches!(engine.search_bm25(&["docum"], 0), Err(Error::ZeroK { .. })));
    }

    #[test]
    fn boolean_search_requires_all_terms() {
        let f = fixture();
        let engine = QueryEngine::new(&f.index, &f.matrix, Some(&f.factors));
        let ids: Vec<DocId> = engine.search_boolean(&["internet", "web"]).iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert!(engine.search_boolean(&["internet", "unknown"]).is_empty());
    }

    #[test]
    fn search_dispatch_and_limit() {
        let f = fixture();
        let engine = QueryEngine::new(&f.index, &f.matrix, Some(&f.factors));
        let hits = engine.search(RankingMode::LatentSemantic, &["web", "surfing"], Some(2)).unwrap();
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1, 4]);
        let hits = engine.search(RankingMode::Bm25, &["beach"], None).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(engine.search(RankingMode::VectorSpace, &Vec::<String>::new(), None).unwrap().is_empty());
    }

    #[test]
    fn zero_limit_is_empty_in_every_mode() {
        let f = fixture();
        let engine = QueryEngine::new(&f.index, &f.matrix, Some(&f.factors));
        for mode in [RankingMode::Bm25, RankingMode::VectorSpace, RankingMode::LatentSemantic] {
            assert_eq!(engine.search(mode, &["web", "surfing"], Some(0)), Ok(Vec::new()));
        }
    }

    #[test]
    fn rounding_folds_negative_zero() {
        let r = round_to(-1e-17, 3);
        assert_eq!(r, 0.0);
        assert!(r.is_sign_positive());
    }
}
