use crate::bm25::WeightedIndex;
use crate::cluster::{Clustering, KMeans};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::eval::{self, BenchmarkQuery, Metrics};
use crate::index::{DocId, IndexBuilder, InvertedIndex};
use crate::lsi::{LatentFactors, RelatedPair};
use crate::matrix::TermDocumentMatrix;
use crate::query::{Hit, QueryEngine, RankingMode};
use crate::tokenizer::Tokenizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

/// Raw index, BM25 index and term-document matrix of one collection. Latent
/// factors are computed on first use.
#[derive(Debug)]
pub struct SearchModel {
    config: EngineConfig,
    tokenizer: Tokenizer,
    raw: InvertedIndex,
    index: WeightedIndex,
    matrix: TermDocumentMatrix,
    factors: OnceLock<Result<LatentFactors>>,
}

impl SearchModel {
    /// Tokenizes each document with the configured tokenizer and builds the model.
    pub fn build<I, S>(documents: I, config: EngineConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokenizer = Tokenizer::new(config.tokenizer.clone());
        let mut builder = IndexBuilder::new();
        for doc in documents {
            builder.add_document(tokenizer.tokenize(doc.as_ref()));
        }
        Self::from_index(builder.finish()?, config)
    }

    pub fn from_index(raw: InvertedIndex, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let index = config.bm25.weigh(&raw)?;
        let matrix = TermDocumentMatrix::build(&index, &config.matrix);
        Ok(Self { tokenizer: Tokenizer::new(config.tokenizer.clone()), config, raw, index, matrix, factors: OnceLock::new() })
    }

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }
    pub fn raw_index(&self) -> &InvertedIndex { &self.raw }
    pub fn index(&self) -> &WeightedIndex { &self.index }
    pub fn matrix(&self) -> &TermDocumentMatrix { &self.matrix }
    pub fn num_docs(&self) -> usize { self.raw.stats.num_docs as usize }

    /// Runs the SVD the first time it is asked for. A failure is cached too.
    pub fn factors(&self) -> Result<&LatentFactors> {
        let lsi = self.config.lsi.as_ref().ok_or(Error::LatentFactorsUnavailable)?;
        self.factors.get_or_init(|| LatentFactors::compute(&self.matrix, lsi)).as_ref().map_err(Clone::clone)
    }

    /// Query engine for `mode`; only latent-semantic ranking needs the factors.
    pub fn engine(&self, mode: RankingMode) -> Result<QueryEngine<'_>> {
        let factors = match mode {
            RankingMode::LatentSemantic => Some(self.factors()?),
            RankingMode::Bm25 | RankingMode::VectorSpace => None,
        };
        Ok(QueryEngine::new(&self.index, &self.matrix, factors))
    }

    /// Tokenizes `query` like the documents and ranks in `mode`.
    pub fn search(&self, mode: RankingMode, query: &str, limit: Option<usize>) -> Result<Vec<Hit>> {
        let terms = self.tokenizer.tokenize(query);
        self.engine(mode)?.search(mode, &terms, limit)
    }

    /// Documents containing every query term.
    pub fn search_boolean(&self, query: &str) -> Vec<Hit> {
        let terms = self.tokenizer.tokenize(query);
        QueryEngine::new(&self.index, &self.matrix, None).search_boolean(&terms)
    }

    /// k-means seeded from `kmeans.seed`, or from the OS when unset.
    pub fn cluster(&self) -> Result<Clustering> {
        let mut rng = match self.config.kmeans.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.cluster_with(&mut rng)
    }

    pub fn cluster_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Clustering> {
        KMeans::init(&self.matrix, &self.config.kmeans, rng)?.run(rng)
    }

    pub fn related_terms(&self, count: usize) -> Result<Vec<RelatedPair>> {
        Ok(self.factors()?.related_term_pairs(count))
    }

    /// MP@3, MP@R and MAP of `mode` over a benchmark.
    pub fn evaluate(&self, mode: RankingMode, queries: &[BenchmarkQuery]) -> Result<Metrics> {
        let engine = self.engine(mode)?;
        let metrics = eval::evaluate(queries, |q| {
            let hits = engine.search(mode, &self.tokenizer.tokenize(&q.query), None)?;
            Ok(hits.into_iter().map(|h| h.doc_id).collect::<Vec<DocId>>())
        })?;
        tracing::info!(?mode, queries = queries.len(), mp_at_3 = metrics.mp_at_3, mp_at_r = metrics.mp_at_r, map = metrics.map, "evaluated benchmark");
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatrixConfig;

    const SURFING: [&str; 6] = [
        "internet web surfing",
        "internet surfing",
        "web surfing",
        "internet web surfing surfing beach",
        "surfing beach",
        "surfing beach",
    ];

    fn model() -> SearchModel {
        let config = EngineConfig { matrix: MatrixConfig { max_terms: Some(4), l2_normalize: false }, ..Default::default() };
        SearchModel::build(SURFING, config).unwrap()
    }

    #[test]
    fn builds_every_stage() {
        let m = model();
        assert_eq!(m.num_docs(), 6);
        assert_eq!(m.matrix().num_rows(), 4);
        assert_eq!(m.factors().map(|f| f.rank()), Ok(2));
        assert_eq!(m.index().weight("surfing", 1), Some(0.0));
    }

    #[test]
    fn free_text_queries_are_tokenized() {
        let m = model();
        let ids = |hits: Vec<Hit>| hits.into_iter().map(|h| h.doc_id).collect::<Vec<_>>();
        assert_eq!(ids(m.search(RankingMode::VectorSpace, "Web, SURFING!", None).unwrap()), vec![3, 1, 4]);
        assert_eq!(ids(m.search(RankingMode::LatentSemantic, "web surfing", Some(3)).unwrap()), vec![1, 4, 3]);
        assert_eq!(ids(m.search_boolean("beach internet")), vec![4]);
    }

    #[test]
    fn empty_collection_aborts() {
        assert_eq!(SearchModel::build(Vec::<&str>::new(), EngineConfig::default()).unwrap_err(), Error::EmptyCollection);
    }

    #[test]
    fn lsi_can_be_disabled() {
        let config = EngineConfig { lsi: None, ..Default::default() };
        let m = SearchModel::build(SURFING, config).unwrap();
        assert_eq!(m.factors().unwrap_err(), Error::LatentFactorsUnavailable);
        assert_eq!(m.related_terms(3).unwrap_err(), Error::LatentFactorsUnavailable);
        assert_eq!(m.search(RankingMode::LatentSemantic, "web", None).unwrap_err(), Error::LatentFactorsUnavailable);
    }

    #[test]
    fn seeded_clustering_is_reproducible() {
        let mut config = EngineConfig::default();
        config.kmeans.seed = Some(7);
        let m = SearchModel::build(SURFING, config).unwrap();
        let (a, b) = (m.cluster().unwrap(), m.cluster().unwrap());
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.assignment.len(), 6);
    }

    #[test]
    fn evaluates_against_judgments() {
        let m = model();
        let queries = eval::parse_benchmark("web surfing\t1 3 4\nbeach\t4 5 6").unwrap();
        let vsm = m.evaluate(RankingMode::VectorSpace, &queries).unwrap();
        // both queries return exactly their relevant set
        assert!((vsm.map - 1.0).abs() < 1e-12);
        assert!((vsm.mp_at_r - 1.0).abs() < 1e-12);
        let lsi = m.evaluate(RankingMode::LatentSemantic, &queries).unwrap();
        assert!((0.0..=1.0).contains(&lsi.map));
    }

    #[test]
    fn identical_documents_rank_by_line_number() {
        let m = SearchModel::build(["x y", "x y", "z"], EngineConfig { lsi: None, ..Default::default() }).unwrap();
        let hits = m.search(RankingMode::VectorSpace, "x", None).unwrap();
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(hits[0].score, hits[1].score);
    }

    #[test]
    fn tiny_collection_ranks_without_latent_factors() {
        let m = SearchModel::build(["apple banana", "banana cherry"], EngineConfig::default()).unwrap();
        let hits = m.search(RankingMode::VectorSpace, "apple", None).unwrap();
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(m.search(RankingMode::Bm25, "cherry", None).unwrap().len(), 1);
        assert!(m.cluster().is_ok());
        assert_eq!(m.search(RankingMode::LatentSemantic, "apple", None).unwrap_err(), Error::InvalidRank { rank: 2, max: 2 });
        assert_eq!(m.related_terms(1).unwrap_err(), Error::InvalidRank { rank: 2, max: 2 });
        let queries = eval::parse_benchmark("apple\t1").unwrap();
        assert_eq!(m.evaluate(RankingMode::VectorSpace, &queries).unwrap().map, 1.0);
        assert!(m.evaluate(RankingMode::LatentSemantic, &queries).is_err());
    }
}
