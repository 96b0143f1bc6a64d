pub mod bm25;
pub mod cluster;
pub mod config;
pub mod error;
pub mod eval;
pub mod index;
pub mod lsi;
pub mod matrix;
pub mod model;
pub mod postings;
pub mod query;
pub mod select;
pub mod tokenizer;

pub use bm25::WeightedIndex;
pub use cluster::{Clustering, KMeans, KMeansState};
pub use config::{Bm25Params, EmptyClusterPolicy, EngineConfig, KMeansConfig, LsiConfig, MatrixConfig, TokenizerConfig};
pub use error::{Error, Result};
pub use eval::{BenchmarkQuery, Metrics};
pub use index::{CollectionStats, DocId, IndexBuilder, InvertedIndex, Posting, RawPosting, TermId};
pub use lsi::{LatentFactors, RelatedPair};
pub use matrix::TermDocumentMatrix;
pub use model::SearchModel;
pub use query::{Hit, QueryEngine, RankingMode};
