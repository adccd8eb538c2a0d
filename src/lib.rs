//! pregel-runtime: vertex-centric bulk-synchronous-parallel graph engine
//!
//! A job runs an [`Algorithm`] over a [`Graph`] in global supersteps.
//! - VertexComputation: per-vertex compute with messages from the previous superstep
//! - IncomingCache / OutgoingCache: message buffering, optional combining
//! - AggregatorHandler: transient and permanent global values
//! - MasterContext: coordinator hooks between supersteps
//! - Conductor: superstep loop, termination, checkpoints and compensation
//!
//! # Example
//!
//! ```rust,ignore
//! use pregel_runtime::{Conductor, Graph, PregelConfig};
//! use pregel_runtime::algos::ShortestPath;
//!
//! let graph = Graph::from_json_file("graph.json")?;
//! let sssp = ShortestPath::new("0/a".parse()?);
//!
//! let mut conductor = Conductor::new(sssp, graph, PregelConfig::default().with_workers(4))?;
//! let result = conductor.run().await?;
//! println!("{}", serde_json::to_string_pretty(&result.documents)?);
//! ```

pub mod aggregator;
pub mod algorithm;
pub mod algos;
pub mod cache;
pub mod checkpoint;
pub mod combiner;
pub mod computation;
pub mod conductor;
pub mod config;
pub mod error;
pub mod format;
pub mod graph;
pub mod master;
pub mod stats;
pub mod transport;
pub mod vertex;
mod worker;

// Re-exports for convenience
pub use aggregator::{
    Aggregator, AggregatorHandler, AggregatorLifetime, AggregatorRegistration, BoolOrAggregator,
    Converging, KeyedAggregator, MaxAggregator, MinAggregator, OverwriteAggregator, Permanent,
    SumAggregator,
};
pub use algorithm::{Algorithm, BoxedCompensation, BoxedComputation};
pub use cache::{IncomingCache, MessageIterator, OutgoingCache};
pub use checkpoint::{
    create_checkpointer, Checkpoint, Checkpointer, CheckpointerConfig, FileCheckpointer,
    MemoryCheckpointer,
};
pub use combiner::{FnCombiner, MaxCombiner, MessageCombiner, MinCombiner, SumCombiner};
pub use computation::{ComputeContext, SuperstepInfo, VertexCompensation, VertexComputation};
pub use conductor::{Conductor, ExecutionState, JobControl, PregelResult, TerminationReason};
pub use config::PregelConfig;
pub use error::PregelError;
pub use format::{GraphFormat, JsonGraphFormat, JsonMessageFormat, MessageFormat};
pub use graph::{EdgeDocument, Graph, VertexDocument};
pub use master::{Continuation, DefaultMasterContext, MasterContext, MasterScope};
pub use stats::{JobStatistics, SuperstepStats, WorkerStats};
pub use transport::{InProcessTransport, ShardMap, Transport};
pub use vertex::{Edge, PregelId, ShardId, Vertex, VertexState};
