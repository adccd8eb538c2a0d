//! Pregel job runner
//!
//! Loads a JSON graph, runs one of the bundled algorithms and prints the
//! result documents as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Shortest paths from vertex "0/a"
//! pregel-run graph.json sssp --source 0/a
//!
//! # PageRank with a custom config and checkpoint directory
//! pregel-run graph.json pagerank --config pregel.json --checkpoints ./ckpt
//!
//! # Engine logs
//! RUST_LOG=pregel_runtime=debug pregel-run graph.json pagerank
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use pregel_runtime::algos::{PageRank, ShortestPath};
use pregel_runtime::checkpoint::{create_checkpointer, CheckpointerConfig};
use pregel_runtime::{Algorithm, Conductor, Graph, PregelConfig, PregelResult};

/// Runs a vertex-centric graph algorithm over a JSON graph
#[derive(Parser, Debug)]
#[command(name = "pregel-run")]
#[command(version)]
struct Args {
    /// Graph file: {"vertices": [...], "edges": [...]}
    graph: PathBuf,

    /// Engine configuration file (JSON); missing fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Directory for file checkpoints (in-memory when omitted)
    #[arg(long, global = true)]
    checkpoints: Option<PathBuf>,

    /// Compress file checkpoints with zstd
    #[arg(long, global = true)]
    compress: bool,

    /// Print statistics and aggregators along with the documents
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    algorithm: AlgorithmArgs,
}

#[derive(Subcommand, Debug)]
enum AlgorithmArgs {
    /// Single-source shortest paths
    Sssp {
        /// Source vertex as shard/key
        #[arg(short, long)]
        source: String,
    },
    /// PageRank
    Pagerank {
        #[arg(long, default_value_t = 0.85)]
        damping: f64,
        #[arg(long, default_value_t = 1e-5)]
        epsilon: f64,
        #[arg(long, default_value_t = 50)]
        max_iterations: u64,
    },
}

impl AlgorithmArgs {
    /// Job parameters in the form the algorithms validate
    fn params(&self) -> Value {
        match self {
            AlgorithmArgs::Sssp { source } => json!({ "source": source }),
            AlgorithmArgs::Pagerank {
                damping,
                epsilon,
                max_iterations,
            } => json!({
                "damping": damping,
                "epsilon": epsilon,
                "max_iterations": max_iterations,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PregelConfig::from_json_file(path)?,
        None => PregelConfig::default(),
    };
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    let params = args.algorithm.params();
    let result = match &args.algorithm {
        AlgorithmArgs::Sssp { .. } => {
            let sssp = ShortestPath::from_params(&params).context("invalid sssp arguments")?;
            run(sssp, config, &args).await?
        }
        AlgorithmArgs::Pagerank { .. } => {
            let page_rank = PageRank::from_params(&params).context("invalid pagerank arguments")?;
            run(page_rank, config, &args).await?
        }
    };

    let output = if args.verbose {
        json!({
            "job_id": result.job_id,
            "supersteps": result.supersteps,
            "termination": result.termination,
            "aggregators": result.aggregators,
            "statistics": result.statistics,
            "documents": result.documents,
        })
    } else {
        serde_json::to_value(&result.documents)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run<A: Algorithm>(algorithm: A, config: PregelConfig, args: &Args) -> Result<PregelResult> {
    let graph = Graph::from_json_file(&args.graph)?;
    info!(
        path = %args.graph.display(),
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "Loaded graph"
    );

    let mut conductor = Conductor::new(algorithm, graph, config)?;
    let checkpointer_config = match &args.checkpoints {
        Some(path) => CheckpointerConfig::File {
            path: path.clone(),
            compression: args.compress,
        },
        None => CheckpointerConfig::Memory,
    };
    let checkpointer = create_checkpointer(checkpointer_config, conductor.job_id());
    conductor = conductor.with_checkpointer(checkpointer);

    conductor
        .run()
        .await
        .with_context(|| format!("job {} failed", conductor.job_id()))
}
