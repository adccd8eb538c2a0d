//! PageRank
//!
//! Ranks start at `1 / N`. Each superstep a vertex spreads its rank evenly
//! over its out-edges and recomputes it from what it received:
//!
//! ```text
//! rank = (1 - d) / N + d * sum(incoming)
//! ```
//!
//! The largest rank change of a superstep is collected in the converging
//! `max_diff` aggregator. The master stops the job once it drops below
//! `epsilon`, or after `max_iterations` supersteps, and counts its rounds in
//! the permanent `rounds` aggregator.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::aggregator::{AggregatorRegistration, Converging, MaxAggregator, SumAggregator};
use crate::algorithm::{Algorithm, BoxedComputation};
use crate::cache::MessageIterator;
use crate::combiner::{MessageCombiner, SumCombiner};
use crate::computation::{ComputeContext, VertexComputation};
use crate::error::PregelError;
use crate::format::GraphFormat;
use crate::master::{Continuation, MasterContext, MasterScope};
use crate::vertex::PregelId;

pub const MAX_DIFF: &str = "max_diff";
pub const ROUNDS: &str = "rounds";

const DEFAULT_DAMPING: f64 = 0.85;
const DEFAULT_EPSILON: f64 = 1e-5;
const DEFAULT_MAX_ITERATIONS: u64 = 50;

/// PageRank with a convergence threshold
#[derive(Debug, Clone)]
pub struct PageRank {
    damping: f64,
    epsilon: f64,
    max_iterations: u64,
}

impl Default for PageRank {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            epsilon: DEFAULT_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl PageRank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Build from job parameters; every field is optional
    ///
    /// `{"damping": 0.85, "epsilon": 1e-5, "max_iterations": 50}`
    pub fn from_params(params: &Value) -> Result<Self, PregelError> {
        let mut page_rank = Self::default();
        if let Some(damping) = params.get("damping") {
            page_rank.damping = damping
                .as_f64()
                .filter(|d| (0.0..=1.0).contains(d))
                .ok_or_else(|| PregelError::invalid_parameter("damping must be a number in [0, 1]"))?;
        }
        if let Some(epsilon) = params.get("epsilon") {
            page_rank.epsilon = epsilon
                .as_f64()
                .filter(|e| *e >= 0.0)
                .ok_or_else(|| PregelError::invalid_parameter("epsilon must be a non-negative number"))?;
        }
        if let Some(max_iterations) = params.get("max_iterations") {
            page_rank.max_iterations = max_iterations
                .as_u64()
                .ok_or_else(|| PregelError::invalid_parameter("max_iterations must be a non-negative integer"))?;
        }
        Ok(page_rank)
    }
}

impl Algorithm for PageRank {
    type Vertex = f64;
    type Edge = ();
    type Message = f64;

    fn name(&self) -> &str {
        "pagerank"
    }

    fn graph_format(&self) -> Arc<dyn GraphFormat<f64, ()>> {
        Arc::new(RankFormat)
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<f64>>> {
        Some(Arc::new(SumCombiner))
    }

    fn create_computation(&self) -> BoxedComputation<Self> {
        Box::new(Spread {
            damping: self.damping,
        })
    }

    fn master_context(&self) -> Option<Box<dyn MasterContext>> {
        Some(Box::new(RankMaster {
            epsilon: self.epsilon,
            max_iterations: self.max_iterations,
        }))
    }

    fn aggregators(&self) -> Vec<AggregatorRegistration> {
        vec![
            AggregatorRegistration::transient(MAX_DIFF, Converging(MaxAggregator::new(0.0f64))),
            AggregatorRegistration::permanent(ROUNDS, SumAggregator::<u64>::new()),
        ]
    }
}

/// Edge documents are ignored; results are `{"rank": r}`
struct RankFormat;

impl GraphFormat<f64, ()> for RankFormat {
    fn copy_vertex_data(&self, _id: &PregelId, _document: &Value) -> Result<f64, PregelError> {
        Ok(0.0)
    }

    fn copy_edge_data(&self, _document: &Value) -> Result<(), PregelError> {
        Ok(())
    }

    fn build_vertex_document(&self, _id: &PregelId, rank: &f64) -> Value {
        json!({ "rank": rank })
    }
}

struct Spread {
    damping: f64,
}

impl VertexComputation<f64, (), f64> for Spread {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, f64, (), f64>, messages: MessageIterator<'_, f64>) {
        let n = ctx.vertex_count().max(1) as f64;
        let rank = if ctx.global_superstep() == 0 {
            1.0 / n
        } else {
            let incoming: f64 = messages.sum();
            let rank = (1.0 - self.damping) / n + self.damping * incoming;
            ctx.aggregate(MAX_DIFF, &(rank - *ctx.vertex_data()).abs());
            rank
        };
        *ctx.mutable_vertex_data() = rank;

        let degree = ctx.edges().len();
        if degree > 0 {
            let share = rank / degree as f64;
            ctx.send_message_to_all_neighbours(share);
        }
    }
}

struct RankMaster {
    epsilon: f64,
    max_iterations: u64,
}

impl MasterContext for RankMaster {
    fn post_global_superstep(&mut self, scope: &mut MasterScope<'_>) -> Continuation {
        scope.aggregate(ROUNDS, &1u64);

        let max_diff = scope.aggregated_value::<f64>(MAX_DIFF).copied().unwrap_or(f64::MAX);
        if scope.global_superstep() > 0 && max_diff < self.epsilon {
            tracing::debug!(superstep = scope.global_superstep(), max_diff, "PageRank converged");
            return Continuation::Stop;
        }
        if scope.global_superstep() >= self.max_iterations {
            return Continuation::Stop;
        }
        Continuation::Continue
    }
}
