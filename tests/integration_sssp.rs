//! Integration tests for shortest paths, recovery and checkpointing
//!
//! These tests run complete jobs through the conductor:
//! - Distances on the weighted 4-cycle, with one and several workers
//! - Partition loss reported from outside and from the master
//! - Partition loss through a panicking worker
//! - Checkpoints taken during the run and used for recovery
//! - Failure modes: no compensation, recovery limit, cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use pregel_runtime::algos::{PageRank, ShortestPath};
use pregel_runtime::{
    Algorithm, BoxedCompensation, BoxedComputation, Checkpointer, ComputeContext, Conductor,
    Continuation, ExecutionState, GraphFormat, Graph, JobControl, MasterContext, MasterScope,
    MemoryCheckpointer, MessageCombiner, MessageIterator, PregelConfig, PregelError, PregelId,
    PregelResult, TerminationReason, VertexComputation,
};

// =============================================================================
// Helpers
// =============================================================================

fn id(i: u32) -> PregelId {
    PregelId::new(i, i.to_string())
}

/// Undirected cycle 0-1 (1), 1-2 (2), 2-3 (3), 3-0 (4); vertex i lives on shard i
fn weighted_cycle() -> Graph {
    let mut graph = Graph::new();
    for i in 0..4 {
        graph.add_vertex(i, i.to_string(), Value::Null);
    }
    graph.add_undirected_edge(&id(0), &id(1), json!({"weight": 1}));
    graph.add_undirected_edge(&id(1), &id(2), json!({"weight": 2}));
    graph.add_undirected_edge(&id(2), &id(3), json!({"weight": 3}));
    graph.add_undirected_edge(&id(3), &id(0), json!({"weight": 4}));
    graph
}

fn config(workers: usize) -> PregelConfig {
    PregelConfig::default()
        .with_workers(workers)
        .with_parallelism(workers)
        .with_checkpoint_interval(0)
}

fn distances(result: &PregelResult) -> Vec<Value> {
    (0..4)
        .map(|i| result.documents[&id(i)]["distance"].clone())
        .collect()
}

fn expected() -> Vec<Value> {
    vec![json!(0), json!(1), json!(3), json!(4)]
}

async fn run_sssp(config: PregelConfig) -> PregelResult {
    let mut conductor = Conductor::new(ShortestPath::new(id(0)), weighted_cycle(), config)
        .expect("valid config");
    conductor.run().await.expect("job failed")
}

// =============================================================================
// Distances
// =============================================================================

#[tokio::test]
async fn test_sssp_on_weighted_cycle() {
    let result = run_sssp(config(1)).await;

    assert_eq!(distances(&result), expected());
    assert_eq!(result.termination, TerminationReason::AllHalted);
    assert_eq!(result.global_superstep, 3);
    assert_eq!(result.supersteps, 4);
    assert_eq!(result.statistics.recoveries, 0);
}

#[tokio::test]
async fn test_sssp_is_independent_of_partitioning() {
    for workers in [2, 3, 4] {
        let result = run_sssp(config(workers).with_message_batch_size(1)).await;
        assert_eq!(distances(&result), expected(), "{} workers", workers);
        assert_eq!(result.global_superstep, 3, "{} workers", workers);
    }
}

#[tokio::test]
async fn test_unreachable_vertex_has_null_distance() {
    let mut graph = weighted_cycle();
    let island = graph.add_vertex(1, "island", Value::Null);

    let mut conductor = Conductor::new(ShortestPath::new(id(0)), graph, config(2)).unwrap();
    let result = conductor.run().await.unwrap();

    assert_eq!(result.documents[&island], json!({"distance": null}));
    assert_eq!(result.documents.len(), 5);
    assert_eq!(conductor.state(), ExecutionState::Done);
}

#[tokio::test]
async fn test_statistics_are_recorded_per_superstep() {
    let result = run_sssp(config(2)).await;
    let stats = &result.statistics;

    assert_eq!(stats.supersteps.len(), 4);
    // Only the source computes in superstep 0 and it reaches two neighbours
    assert_eq!(stats.supersteps[0].computed_count, 1);
    assert_eq!(stats.supersteps[0].sent_count, 2);
    // Nothing improves in the last superstep
    assert_eq!(stats.supersteps[3].sent_count, 0);
    assert_eq!(stats.supersteps[3].active_count, 0);
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn test_reported_loss_is_compensated() {
    let control = JobControl::new();
    control.report_lost_worker(1);

    let mut conductor = Conductor::new(ShortestPath::new(id(0)), weighted_cycle(), config(2))
        .unwrap()
        .with_control(control);
    let result = conductor.run().await.unwrap();

    assert_eq!(distances(&result), expected());
    assert_eq!(result.statistics.recoveries, 1);
    assert_eq!(result.statistics.compensation_rounds, 1);
    assert_eq!(conductor.state(), ExecutionState::Done);
}

#[tokio::test]
async fn test_loss_of_unknown_worker_is_ignored() {
    let control = JobControl::new();
    control.report_lost_worker(7);

    let mut conductor = Conductor::new(ShortestPath::new(id(0)), weighted_cycle(), config(2))
        .unwrap()
        .with_control(control);
    let result = conductor.run().await.unwrap();

    assert_eq!(result.statistics.recoveries, 0);
    assert_eq!(result.global_superstep, 3);
}

/// Shortest paths whose computation panics once on an odd shard
struct FlakyShortestPath {
    inner: ShortestPath,
    armed: Arc<AtomicBool>,
    at: u64,
}

struct Flaky {
    inner: BoxedComputation<ShortestPath>,
    armed: Arc<AtomicBool>,
    at: u64,
}

impl VertexComputation<u64, u64, u64> for Flaky {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, u64, u64, u64>, messages: MessageIterator<'_, u64>) {
        if ctx.global_superstep() == self.at && ctx.id().shard % 2 == 1 && self.armed.swap(false, Ordering::SeqCst) {
            panic!("simulated partition loss");
        }
        self.inner.compute(ctx, messages);
    }
}

impl Algorithm for FlakyShortestPath {
    type Vertex = u64;
    type Edge = u64;
    type Message = u64;

    fn name(&self) -> &str {
        "flaky-sssp"
    }

    fn graph_format(&self) -> Arc<dyn GraphFormat<u64, u64>> {
        self.inner.graph_format()
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<u64>>> {
        self.inner.message_combiner()
    }

    fn create_computation(&self) -> BoxedComputation<Self> {
        Box::new(Flaky {
            inner: self.inner.create_computation(),
            armed: Arc::clone(&self.armed),
            at: self.at,
        })
    }

    fn create_compensation(&self) -> Option<BoxedCompensation<Self>> {
        self.inner.create_compensation()
    }

    fn initial_active(&self, id: &PregelId, data: &u64) -> bool {
        self.inner.initial_active(id, data)
    }
}

#[tokio::test]
async fn test_panicking_worker_is_recovered() {
    let armed = Arc::new(AtomicBool::new(true));
    let algorithm = FlakyShortestPath {
        inner: ShortestPath::new(id(0)),
        armed: Arc::clone(&armed),
        at: 1,
    };

    let mut conductor = Conductor::new(algorithm, weighted_cycle(), config(2)).unwrap();
    let result = conductor.run().await.unwrap();

    assert!(!armed.load(Ordering::SeqCst), "the panic should have fired");
    assert_eq!(distances(&result), expected());
    assert_eq!(result.statistics.recoveries, 1);
}

#[tokio::test]
async fn test_loss_without_compensation_fails() {
    let control = JobControl::new();
    control.report_lost_worker(0);

    let mut conductor = Conductor::new(PageRank::new(), weighted_cycle(), config(2))
        .unwrap()
        .with_control(control);
    let err = conductor.run().await.unwrap_err();

    assert!(matches!(err, PregelError::PartitionLost { worker: 0 }));
    assert_eq!(conductor.state(), ExecutionState::Failed);
}

#[tokio::test]
async fn test_recovery_limit() {
    let control = JobControl::new();
    control.report_lost_worker(1);

    let mut conductor = Conductor::new(
        ShortestPath::new(id(0)),
        weighted_cycle(),
        config(2).with_max_recovery_attempts(0),
    )
    .unwrap()
    .with_control(control);
    let err = conductor.run().await.unwrap_err();

    assert!(matches!(err, PregelError::MaxRecoveriesExceeded { attempts: 0 }));
    assert_eq!(conductor.state(), ExecutionState::Failed);
}

#[tokio::test]
async fn test_cancel_before_first_superstep() {
    let mut conductor = Conductor::new(ShortestPath::new(id(0)), weighted_cycle(), config(1)).unwrap();
    conductor.control().cancel();

    let err = conductor.run().await.unwrap_err();
    assert!(matches!(err, PregelError::Cancelled));
    assert_eq!(conductor.state(), ExecutionState::Canceled);
}

// =============================================================================
// Checkpointing
// =============================================================================

#[tokio::test]
async fn test_checkpoints_are_saved_at_interval() {
    let checkpointer = Arc::new(MemoryCheckpointer::<u64, u64>::new());

    let mut conductor = Conductor::new(
        ShortestPath::new(id(0)),
        weighted_cycle(),
        config(2).with_checkpoint_interval(1),
    )
    .unwrap()
    .with_job_id("sssp-checkpoints")
    .with_checkpointer(checkpointer.clone());
    conductor.run().await.unwrap();

    // The job ends in superstep 3; checkpoints follow supersteps 1 and 2
    assert_eq!(checkpointer.list(0).await.unwrap(), vec![1, 2]);
    assert_eq!(checkpointer.list(1).await.unwrap(), vec![1, 2]);

    let latest = checkpointer.latest(1).await.unwrap().unwrap();
    assert_eq!(latest.job_id, "sssp-checkpoints");
    assert_eq!(latest.superstep, 2);
    let v1 = latest.vertices.iter().find(|v| v.id() == &id(1)).unwrap();
    assert_eq!(v1.data, 1);
}

/// Shortest paths whose master reports a worker lost after a superstep
struct LossReportingShortestPath {
    inner: ShortestPath,
    control: JobControl,
    at: u64,
    worker: usize,
}

struct LossReporter {
    control: JobControl,
    at: u64,
    worker: usize,
}

impl MasterContext for LossReporter {
    fn post_global_superstep(&mut self, scope: &mut MasterScope<'_>) -> Continuation {
        if scope.global_superstep() == self.at {
            self.control.report_lost_worker(self.worker);
        }
        Continuation::Continue
    }
}

impl Algorithm for LossReportingShortestPath {
    type Vertex = u64;
    type Edge = u64;
    type Message = u64;

    fn name(&self) -> &str {
        "loss-reporting-sssp"
    }

    fn graph_format(&self) -> Arc<dyn GraphFormat<u64, u64>> {
        self.inner.graph_format()
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<u64>>> {
        self.inner.message_combiner()
    }

    fn create_computation(&self) -> BoxedComputation<Self> {
        self.inner.create_computation()
    }

    fn create_compensation(&self) -> Option<BoxedCompensation<Self>> {
        self.inner.create_compensation()
    }

    fn master_context(&self) -> Option<Box<dyn MasterContext>> {
        Some(Box::new(LossReporter {
            control: self.control.clone(),
            at: self.at,
            worker: self.worker,
        }))
    }

    fn initial_active(&self, id: &PregelId, data: &u64) -> bool {
        self.inner.initial_active(id, data)
    }
}

#[tokio::test]
async fn test_recovery_from_checkpoint() {
    let control = JobControl::new();
    let checkpointer = Arc::new(MemoryCheckpointer::<u64, u64>::new());
    let algorithm = LossReportingShortestPath {
        inner: ShortestPath::new(id(0)),
        control: control.clone(),
        at: 2,
        worker: 1,
    };

    let mut conductor = Conductor::new(algorithm, weighted_cycle(), config(2).with_checkpoint_interval(1))
        .unwrap()
        .with_control(control)
        .with_checkpointer(checkpointer.clone());
    let result = conductor.run().await.unwrap();

    assert_eq!(distances(&result), expected());
    assert_eq!(result.statistics.recoveries, 1);
    assert!(!checkpointer.list(1).await.unwrap().is_empty());
}
