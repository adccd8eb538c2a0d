//! Superstep conductor
//!
//! Drives a job through its global supersteps:
//!
//! ```text
//!  pre_global_superstep ─► broadcast aggregators ─► workers compute (parallel)
//!          ▲                                               │
//!          │                                          barrier (join)
//!          │                                               ▼
//!   rotate caches ◄── termination check ◄── post_global_superstep ◄── merge
//! ```
//!
//! A worker whose task panics, or that is reported through
//! [`JobControl::report_lost_worker`], is rebuilt and the algorithm's
//! compensation is run before the next superstep.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::aggregator::AggregatorHandler;
use crate::algorithm::Algorithm;
use crate::cache::IncomingCache;
use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::config::PregelConfig;
use crate::error::PregelError;
use crate::graph::Graph;
use crate::master::{DefaultMasterContext, MasterContext, MasterScope};
use crate::stats::{JobStatistics, SuperstepStats, WorkerStats};
use crate::transport::{InProcessTransport, ShardMap, Transport};
use crate::vertex::{PregelId, VertexState};
use crate::worker::{StepContext, StepMode, Worker};

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Created,
    Loading,
    Running,
    Recovering,
    Done,
    Canceled,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled | Self::Failed)
    }
}

/// Why a job stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every vertex halted and no message was sent in the last superstep
    AllHalted,
    /// The master context returned [`Continuation::Stop`]
    MasterStopped,
    /// The master stopped after the converging aggregators settled
    Converged,
    /// The global superstep limit was reached
    MaxSuperstepsReached,
}

/// Outcome of a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PregelResult {
    pub job_id: String,
    /// Last global superstep executed
    pub global_superstep: u64,
    /// Number of global supersteps executed
    pub supersteps: u64,
    pub termination: TerminationReason,
    /// Result document of every vertex
    pub documents: BTreeMap<PregelId, Value>,
    /// Final global aggregator values
    pub aggregators: Value,
    pub statistics: JobStatistics,
}

impl PregelResult {
    pub fn document(&self, id: &PregelId) -> Option<&Value> {
        self.documents.get(id)
    }
}

#[derive(Debug, Default)]
struct ControlInner {
    cancelled: AtomicBool,
    lost: Mutex<BTreeSet<usize>>,
}

/// Shared handle for steering a running job from outside
///
/// Requests are honored between supersteps.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    inner: Arc<ControlInner>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the job before its next superstep
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Declare the partition of `worker` lost
    pub fn report_lost_worker(&self, worker: usize) {
        self.inner
            .lost
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker);
    }

    fn take_lost_workers(&self) -> BTreeSet<usize> {
        std::mem::take(&mut *self.inner.lost.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// What came back from one pass over all workers
#[derive(Default)]
struct WorkerRound {
    stats: Vec<WorkerStats>,
    contributions: Vec<Value>,
    lost: BTreeSet<usize>,
}

/// Counts shown to the master hooks
#[derive(Debug, Clone, Copy, Default)]
struct RoundCounts {
    active: u64,
    messages: u64,
}

/// Runs one algorithm over one graph
pub struct Conductor<A: Algorithm> {
    job_id: String,
    algorithm: Arc<A>,
    graph: Arc<Graph>,
    config: PregelConfig,
    shard_map: ShardMap,
    checkpointer: Option<Arc<dyn Checkpointer<A::Vertex, A::Edge>>>,
    control: JobControl,
    state: ExecutionState,
}

impl<A: Algorithm> Conductor<A> {
    /// Create a conductor after validating the configuration
    pub fn new(algorithm: A, graph: Graph, config: PregelConfig) -> Result<Self, PregelError> {
        config.validate()?;
        Ok(Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            algorithm: Arc::new(algorithm),
            graph: Arc::new(graph),
            shard_map: ShardMap::new(config.num_workers),
            config,
            checkpointer: None,
            control: JobControl::new(),
            state: ExecutionState::Created,
        })
    }

    /// Use a fixed job id instead of a random one
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Save worker checkpoints every `checkpoint_interval` supersteps
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<A::Vertex, A::Edge>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Steer the job through an existing handle
    pub fn with_control(mut self, control: JobControl) -> Self {
        self.control = control;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Handle for cancelling the job or reporting lost workers
    pub fn control(&self) -> JobControl {
        self.control.clone()
    }

    /// Run the job to completion
    pub async fn run(&mut self) -> Result<PregelResult, PregelError> {
        let result = match self.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.execute()).await {
                Ok(result) => result,
                Err(_) => Err(PregelError::JobTimeout(limit)),
            },
            None => self.execute().await,
        };

        match &result {
            Ok(_) => self.state = ExecutionState::Done,
            Err(PregelError::Cancelled) => self.state = ExecutionState::Canceled,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Pregel job failed");
                self.state = ExecutionState::Failed;
            }
        }
        result
    }

    async fn execute(&mut self) -> Result<PregelResult, PregelError> {
        let started = Instant::now();
        let algorithm = Arc::clone(&self.algorithm);
        self.state = ExecutionState::Loading;
        info!(
            job_id = %self.job_id,
            algorithm = algorithm.name(),
            workers = self.config.num_workers,
            vertices = self.graph.vertex_count(),
            edges = self.graph.edge_count(),
            "Starting Pregel job"
        );

        let write_caches: Vec<Arc<IncomingCache<A::Message>>> = (0..self.config.num_workers)
            .map(|_| {
                Arc::new(IncomingCache::new(
                    algorithm.message_format(),
                    algorithm.message_combiner(),
                ))
            })
            .collect();
        let transport: Arc<dyn Transport> =
            Arc::new(InProcessTransport::new(write_caches.clone(), self.shard_map));

        let mut workers = Vec::with_capacity(write_caches.len());
        for (index, write) in write_caches.iter().enumerate() {
            workers.push(Some(self.load_worker(index, Arc::clone(write))?));
        }

        let can_compensate = algorithm.create_compensation().is_some();
        let mut master = algorithm
            .master_context()
            .unwrap_or_else(|| Box::new(DefaultMasterContext));
        let mut master_aggregators = AggregatorHandler::new(algorithm.aggregators());
        let mut statistics = JobStatistics::default();
        let mut counts = RoundCounts::default();

        {
            let mut scope = self.scope(&mut master_aggregators, 0, counts);
            master.pre_application(&mut scope);
        }
        self.state = ExecutionState::Running;

        let template = StepTemplate {
            algorithm: Arc::clone(&algorithm),
            transport,
            shard_map: self.shard_map,
            batch_size: self.config.message_batch_size,
            vertex_count: self.graph.vertex_count() as u64,
            edge_count: self.graph.edge_count() as u64,
        };
        let mut global_superstep = 0u64;
        let mut last_converging: Option<Value> = None;
        let termination = loop {
            if self.control.is_cancelled() {
                info!(job_id = %self.job_id, superstep = global_superstep, "Pregel job cancelled");
                for worker in workers.iter_mut().flatten() {
                    worker.clear_caches();
                }
                return Err(PregelError::Cancelled);
            }

            let superstep_started = Instant::now();
            {
                let mut scope = self.scope(&mut master_aggregators, global_superstep, counts);
                master.pre_global_superstep(&mut scope);
            }
            let broadcast = master_aggregators.serialize_values();
            master_aggregators.reset_values();

            let step = template.step(StepMode::Compute, global_superstep, broadcast);
            let mut round = self.run_workers(&mut workers, step).await?;
            round.lost.extend(self.control.take_lost_workers());
            round.lost.retain(|&worker| {
                let known = worker < write_caches.len();
                if !known {
                    warn!(worker, "Ignoring loss report for unknown worker");
                }
                known
            });

            if !round.lost.is_empty() {
                if !can_compensate {
                    let worker = round.lost.first().copied().unwrap_or_default();
                    return Err(PregelError::PartitionLost { worker });
                }
                self.recover(
                    &mut workers,
                    &write_caches,
                    round.lost,
                    global_superstep,
                    &mut *master,
                    &mut master_aggregators,
                    &mut statistics,
                    &template,
                )
                .await?;
                global_superstep += 1;
                continue;
            }

            for contribution in &round.contributions {
                master_aggregators.parse_values(contribution)?;
            }

            let superstep = SuperstepStats::from_workers(global_superstep, &round.stats, superstep_started.elapsed());
            counts = RoundCounts {
                active: superstep.active_count,
                messages: superstep.sent_count,
            };
            info!(
                job_id = %self.job_id,
                superstep = global_superstep,
                computed = superstep.computed_count,
                active = superstep.active_count,
                sent = superstep.sent_count,
                elapsed = ?superstep.elapsed,
                "Superstep finished"
            );
            statistics.record(superstep);

            let converged = match master_aggregators.converging_values() {
                Some(current) => {
                    let unchanged = global_superstep > 0 && last_converging.as_ref() == Some(&current);
                    last_converging = Some(current);
                    unchanged
                }
                None => false,
            };
            let decision = {
                let mut scope = self.scope(&mut master_aggregators, global_superstep, counts);
                scope.converged = converged;
                master.post_global_superstep(&mut scope)
            };

            let quiescent = workers.iter().flatten().all(|w| w.is_quiescent());
            let delivered: usize = workers.iter().flatten().map(|w| w.delivered_message_count()).sum();
            if quiescent && delivered == 0 {
                break TerminationReason::AllHalted;
            }
            if decision.is_stop() {
                break if converged {
                    TerminationReason::Converged
                } else {
                    TerminationReason::MasterStopped
                };
            }
            if global_superstep + 1 >= self.config.max_global_supersteps {
                break TerminationReason::MaxSuperstepsReached;
            }

            if self.config.should_checkpoint(global_superstep) {
                self.save_checkpoints(&workers, global_superstep).await?;
            }

            for worker in workers.iter_mut().flatten() {
                worker.rotate_caches();
            }
            global_superstep += 1;
        };

        {
            let mut scope = self.scope(&mut master_aggregators, global_superstep, counts);
            master.post_application(&mut scope);
        }

        let graph_format = algorithm.graph_format();
        let mut documents = BTreeMap::new();
        for worker in workers.iter().flatten() {
            worker.collect_documents(&*graph_format, &mut documents);
        }

        statistics.elapsed = started.elapsed();
        statistics.log_summary(algorithm.name());
        info!(
            job_id = %self.job_id,
            superstep = global_superstep,
            termination = ?termination,
            "Pregel job finished"
        );

        Ok(PregelResult {
            job_id: self.job_id.clone(),
            global_superstep,
            supersteps: global_superstep + 1,
            termination,
            documents,
            aggregators: master_aggregators.serialize_values(),
            statistics,
        })
    }

    fn scope<'a>(
        &self,
        aggregators: &'a mut AggregatorHandler,
        global_superstep: u64,
        counts: RoundCounts,
    ) -> MasterScope<'a> {
        let mut scope = MasterScope::new(aggregators, global_superstep);
        scope.vertex_count = self.graph.vertex_count() as u64;
        scope.edge_count = self.graph.edge_count() as u64;
        scope.active_count = counts.active;
        scope.message_count = counts.messages;
        scope
    }

    /// Build a worker from the graph, applying the initial activation
    fn load_worker(
        &self,
        index: usize,
        write: Arc<IncomingCache<A::Message>>,
    ) -> Result<Worker<A>, PregelError> {
        let format = self.algorithm.graph_format();
        let mut vertices = self.graph.load_partition(&*format, self.shard_map, index)?;
        for vertex in &mut vertices {
            if !self.algorithm.initial_active(vertex.id(), &vertex.data) {
                vertex.set_state(VertexState::Halted);
            }
        }
        debug!(worker = index, vertices = vertices.len(), "Loaded partition");
        Ok(Worker::new(index, &self.algorithm, vertices, write))
    }

    /// Run one pass on every worker, at most `parallelism` at a time
    async fn run_workers(
        &self,
        workers: &mut [Option<Worker<A>>],
        step: StepContext<A>,
    ) -> Result<WorkerRound, PregelError> {
        let step = Arc::new(step);
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let mut indices = Vec::with_capacity(workers.len());
        let mut handles = Vec::with_capacity(workers.len());

        for (index, slot) in workers.iter_mut().enumerate() {
            let Some(mut worker) = slot.take() else {
                continue;
            };
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| PregelError::worker_failed(index, e.to_string()))?;
            let step = Arc::clone(&step);
            indices.push(index);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = worker.run(&step);
                (worker, outcome)
            }));
        }

        let mut round = WorkerRound::default();
        let mut failure = None;
        for (index, joined) in indices.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok((worker, Ok(outcome))) => {
                    workers[index] = Some(worker);
                    round.stats.push(outcome.stats);
                    round.contributions.push(outcome.aggregators);
                }
                Ok((worker, Err(e))) => {
                    workers[index] = Some(worker);
                    failure.get_or_insert(e);
                }
                Err(e) if e.is_panic() => {
                    warn!(worker = index, superstep = step.global_superstep, "Worker task panicked");
                    round.lost.insert(index);
                }
                Err(e) => {
                    failure.get_or_insert(PregelError::worker_failed(index, e.to_string()));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(round),
        }
    }

    async fn save_checkpoints(
        &self,
        workers: &[Option<Worker<A>>],
        global_superstep: u64,
    ) -> Result<(), PregelError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(());
        };
        for worker in workers.iter().flatten() {
            let checkpoint = Checkpoint::new(&self.job_id, worker.index(), global_superstep, worker.snapshot())
                .with_metadata("algorithm", self.algorithm.name());
            checkpointer.save(&checkpoint).await?;
        }
        debug!(superstep = global_superstep, "Saved worker checkpoints");
        Ok(())
    }

    /// Rebuild lost workers and run compensation until the master stops it
    #[allow(clippy::too_many_arguments)]
    async fn recover(
        &mut self,
        workers: &mut [Option<Worker<A>>],
        write_caches: &[Arc<IncomingCache<A::Message>>],
        lost: BTreeSet<usize>,
        global_superstep: u64,
        master: &mut dyn MasterContext,
        master_aggregators: &mut AggregatorHandler,
        statistics: &mut JobStatistics,
        template: &StepTemplate<A>,
    ) -> Result<(), PregelError> {
        self.state = ExecutionState::Recovering;
        if statistics.recoveries >= self.config.max_recovery_attempts {
            return Err(PregelError::MaxRecoveriesExceeded {
                attempts: statistics.recoveries,
            });
        }
        statistics.recoveries += 1;
        warn!(
            job_id = %self.job_id,
            superstep = global_superstep,
            lost = ?lost,
            attempt = statistics.recoveries,
            "Recovering lost partitions"
        );

        for &index in &lost {
            let mut worker = self.restore_worker(index, Arc::clone(&write_caches[index])).await?;
            worker.mark_lost();
            workers[index] = Some(worker);
        }
        for worker in workers.iter_mut().flatten() {
            worker.clear_caches();
        }

        for round in 0..self.config.max_compensation_rounds {
            {
                let mut scope = self.scope(master_aggregators, global_superstep, RoundCounts::default());
                master.pre_compensation(&mut scope);
            }
            let broadcast = master_aggregators.serialize_values();
            master_aggregators.reset_values();

            let outcome = self
                .run_workers(workers, template.step(StepMode::Compensate, global_superstep, broadcast))
                .await?;
            if let Some(&worker) = outcome.lost.iter().next() {
                return Err(PregelError::worker_failed(worker, "lost during compensation"));
            }
            for contribution in &outcome.contributions {
                master_aggregators.parse_values(contribution)?;
            }
            statistics.compensation_rounds += 1;
            debug!(round, superstep = global_superstep, "Compensation round finished");

            let mut scope = self.scope(master_aggregators, global_superstep, RoundCounts::default());
            if master.post_compensation(&mut scope).is_stop() {
                break;
            }
        }

        for worker in workers.iter_mut().flatten() {
            worker.rotate_caches();
            worker.finish_compensation();
        }
        self.state = ExecutionState::Running;
        Ok(())
    }

    /// Rebuild a worker from its latest checkpoint, or from the graph
    async fn restore_worker(
        &self,
        index: usize,
        write: Arc<IncomingCache<A::Message>>,
    ) -> Result<Worker<A>, PregelError> {
        if let Some(checkpointer) = &self.checkpointer {
            if let Some(checkpoint) = checkpointer.latest(index).await? {
                info!(worker = index, superstep = checkpoint.superstep, "Restoring worker from checkpoint");
                return Ok(Worker::new(index, &self.algorithm, checkpoint.vertices, write));
            }
        }
        info!(worker = index, "Reloading worker partition from graph");
        self.load_worker(index, write)
    }
}

/// The parts of a [`StepContext`] that stay fixed for a whole job
struct StepTemplate<A: Algorithm> {
    algorithm: Arc<A>,
    transport: Arc<dyn Transport>,
    shard_map: ShardMap,
    batch_size: usize,
    vertex_count: u64,
    edge_count: u64,
}

impl<A: Algorithm> StepTemplate<A> {
    fn step(&self, mode: StepMode, global_superstep: u64, aggregators: Value) -> StepContext<A> {
        StepContext {
            algorithm: Arc::clone(&self.algorithm),
            mode,
            global_superstep,
            vertex_count: self.vertex_count,
            edge_count: self.edge_count,
            aggregators,
            transport: Arc::clone(&self.transport),
            shard_map: self.shard_map,
            batch_size: self.batch_size,
        }
    }
}
