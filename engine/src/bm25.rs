use crate::config::Bm25Params;
use crate::error::{Error, Result};
use crate::index::{CollectionStats, DocId, InvertedIndex, Posting, TermId, TermLists};
use std::collections::HashMap;

/// `log2(N / df)`. Zero when the term occurs in every document.
pub fn idf(num_docs: u32, df: u32) -> Option<f64> {
    if df == 0 {
        return None;
    }
    Some((num_docs as f64 / df as f64).log2())
}

impl Bm25Params {
    /// Saturated term frequency `tf*`.
    pub fn tf_star(&self, tf: f64, doc_len: f64, avg_doc_len: f64) -> f64 {
        let k = self.k1;
        let b = self.b;
        tf * (k + 1.0) / (k * (1.0 - b + b * doc_len / avg_doc_len) + tf)
    }

    /// Builds a separate index; the raw frequencies are left untouched.
    pub fn weigh(&self, index: &InvertedIndex) -> Result<WeightedIndex> {
        let stats = &index.stats;
        let n = stats.num_docs;
        let mut postings = Vec::with_capacity(index.postings.len());
        let mut zero_idf_terms = 0usize;
        for (tid, plist) in index.postings.iter().enumerate() {
            let df = plist.len() as u32;
            let idf = idf(n, df).ok_or_else(|| Error::ZeroDocumentFrequency { term: index.terms[tid].clone() })?;
            if idf == 0.0 { zero_idf_terms += 1; }
            let weighted = plist
                .iter()
                .map(|p| {
                    let dl = stats.doc_length(p.doc_id) as f64;
                    Posting::new(p.doc_id, self.tf_star(p.tf as f64, dl, stats.avg_doc_length) * idf)
                })
                .collect();
            postings.push(weighted);
        }
        tracing::info!(num_terms = postings.len(), zero_idf_terms, k1 = self.k1, b = self.b, "applied bm25 weights");
        Ok(WeightedIndex {
            dictionary: index.dictionary.clone(),
            terms: index.terms.clone(),
            postings,
            stats: stats.clone(),
            params: *self,
        })
    }
}

/// Term -> postings carrying BM25 relevance weights.
#[derive(Debug, Clone)]
pub struct WeightedIndex {
    pub dictionary: HashMap<String, TermId>,
    pub terms: Vec<String>,
    pub postings: Vec<Vec<Posting>>,
    pub stats: CollectionStats,
    pub params: Bm25Params,
}

impl WeightedIndex {
    pub fn get(&self, term: &str) -> Option<&[Posting]> {
        self.dictionary.get(term).map(|&tid| self.postings[tid as usize].as_slice())
    }

    pub fn weight(&self, term: &str, doc_id: DocId) -> Option<f64> {
        let list = self.get(term)?;
        list.binary_search_by_key(&doc_id, |p| p.doc_id).ok().map(|i| list[i].weight)
    }
}

impl TermLists for WeightedIndex {
    type Entry = Posting;
    fn terms(&self) -> &[String] { &self.terms }
    fn postings(&self, term_id: TermId) -> &[Posting] { &self.postings[term_id as usize] }
    fn num_docs(&self) -> u32 { self.stats.num_docs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round3(x: f64) -> f64 { (x * 1000.0).round() / 1000.0 }

    #[test]
    fn term_in_every_document_weighs_zero() {
        let idx = InvertedIndex::from_documents(vec![vec!["the", "first", "doc"], vec!["the", "second", "doc"], vec!["the", "third", "doc"]]).unwrap();
        let w = Bm25Params::default().weigh(&idx).unwrap();
        for p in w.get("doc").unwrap() {
            assert_eq!(p.weight, 0.0);
        }
    }

    #[test]
    fn weight_matches_formula() {
        // dl = 2, avdl = 3, tf = 1, df = 1, N = 3
        let idx = InvertedIndex::from_documents(vec![
            vec!["first", "doc"],
            vec!["second", "doc", "x", "y"],
            vec!["third", "doc", "z"],
        ])
        .unwrap();
        let w = Bm25Params { k1: 1.75, b: 0.75 }.weigh(&idx).unwrap();
        assert_eq!(round3(w.weight("first", 1).unwrap()), 1.885);
    }

    #[test]
    fn equal_length_documents_reduce_to_idf() {
        let idx = InvertedIndex::from_documents(vec![vec!["a", "x"], vec!["b", "x"], vec!["c", "x"]]).unwrap();
        let w = Bm25Params::default().weigh(&idx).unwrap();
        let expected = 3f64.log2();
        assert!((w.weight("a", 1).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn raw_index_is_left_untouched() {
        let idx = InvertedIndex::from_documents(vec![vec!["a", "a"], vec!["b"]]).unwrap();
        let before = idx.postings.clone();
        let _ = Bm25Params::default().weigh(&idx).unwrap();
        assert_eq!(idx.postings, before);
    }

    #[test]
    fn b_zero_ignores_document_length() {
        let p = Bm25Params { k1: 1.2, b: 0.0 };
        assert_eq!(p.tf_star(2.0, 10.0, 3.0), p.tf_star(2.0, 1.0, 3.0));
    }

    #[test]
    fn idf_rejects_zero_df() {
        assert_eq!(idf(5, 0), None);
        assert_eq!(idf(4, 4), Some(0.0));
    }
}
