use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::SearchModel;
use indexer::{cluster_report, load_benchmark, load_collection, load_config, related_terms, run_benchmark, Mode, Overrides};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Rank, cluster and evaluate a line-per-document collection with BM25, VSM and LSI", long_about = None)]
struct Cli {
    /// JSON engine configuration; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print JSON instead of plain text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the collection against a free-text query
    Query {
        /// Collection file or directory of *.txt files
        #[arg(long)]
        collection: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Vsm)]
        mode: Mode,
        /// Maximum number of hits
        #[arg(long)]
        limit: Option<usize>,
        /// Return only documents containing every term, unranked
        #[arg(long, default_value_t = false)]
        boolean: bool,
        query: String,
    },
    /// Compute MP@3, MP@R and MAP for every ranking mode
    Bench {
        #[arg(long)]
        collection: PathBuf,
        /// Tab-separated `query<TAB>relevant ids` lines
        #[arg(long)]
        benchmark: PathBuf,
    },
    /// Spherical k-means over the documents
    Cluster {
        #[arg(long)]
        collection: PathBuf,
        /// Terms listed per centroid
        #[arg(long, default_value_t = 5)]
        top_terms: usize,
    },
    /// Term pairs that are closest in latent space
    Related {
        #[arg(long)]
        collection: PathBuf,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::Query { collection, mode, limit, boolean, query } => {
            let model = SearchModel::build(load_collection(&collection)?, config)?;
            let hits = if boolean {
                let mut hits = model.search_boolean(&query);
                if let Some(limit) = limit {
                    hits.truncate(limit);
                }
                hits
            } else {
                model.search(mode.into(), &query, limit)?
            };
            if cli.json {
                print_json(&hits)?;
            } else {
                for hit in &hits {
                    println!("{}\t{:.3}", hit.doc_id, hit.score);
                }
            }
        }
        Commands::Bench { collection, benchmark } => {
            let queries = load_benchmark(&benchmark)?;
            let model = SearchModel::build(load_collection(&collection)?, config)?;
            let report = run_benchmark(&model, &queries)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{:<10} {:>7} {:>7} {:>7}", "mode", "MP@3", "MP@R", "MAP");
                let rows = [("bm25", Some(report.bm25)), ("vsm", Some(report.vector_space)), ("lsi", report.latent_semantic), ("blended", report.blended)];
                for (name, metrics) in rows {
                    if let Some(m) = metrics {
                        println!("{:<10} {:>7.4} {:>7.4} {:>7.4}", name, m.mp_at_3, m.mp_at_r, m.map);
                    }
                }
            }
        }
        Commands::Cluster { collection, top_terms } => {
            let model = SearchModel::build(load_collection(&collection)?, config)?;
            let report = cluster_report(&model, top_terms)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("iterations {} converged {} rss {:.6}", report.iterations, report.converged, report.rss);
                for c in &report.clusters {
                    let terms: Vec<&str> = c.top_terms.iter().map(|t| t.term.as_str()).collect();
                    println!("cluster {} ({} docs) [{}]: {:?}", c.cluster, c.size, terms.join(", "), c.members);
                }
            }
        }
        Commands::Related { collection, count } => {
            let model = SearchModel::build(load_collection(&collection)?, config)?;
            let pairs = related_terms(&model, count)?;
            if cli.json {
                print_json(&pairs)?;
            } else {
                for p in &pairs {
                    println!("{:.3}\t{}\t{}", p.score, p.first, p.second);
                }
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
