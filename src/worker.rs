//! Partition worker
//!
//! A worker owns the vertices of its shards, a read cache holding the
//! messages of the previous superstep and a shared write cache receiving
//! the messages of the current one. The conductor moves each worker into a
//! blocking task for one pass and gets it back at the barrier.
//!
//! Vertices of one worker are computed sequentially; parallelism comes from
//! running workers side by side.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::aggregator::AggregatorHandler;
use crate::algorithm::{Algorithm, BoxedCompensation, BoxedComputation};
use crate::cache::{IncomingCache, OutgoingCache};
use crate::combiner::MessageCombiner;
use crate::computation::{ComputeContext, SuperstepInfo};
use crate::error::PregelError;
use crate::format::{GraphFormat, MessageFormat};
use crate::stats::WorkerStats;
use crate::transport::{ShardMap, Transport};
use crate::vertex::{PregelId, Vertex, VertexState};

/// Which callback a pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepMode {
    Compute,
    Compensate,
}

/// Inputs shared by every worker of one pass
pub(crate) struct StepContext<A: Algorithm> {
    pub algorithm: Arc<A>,
    pub mode: StepMode,
    pub global_superstep: u64,
    pub vertex_count: u64,
    pub edge_count: u64,
    /// Global aggregator values broadcast by the master
    pub aggregators: Value,
    pub transport: Arc<dyn Transport>,
    pub shard_map: ShardMap,
    pub batch_size: usize,
}

/// What a worker reports at the barrier
pub(crate) struct StepOutcome {
    pub stats: WorkerStats,
    /// Local aggregator contributions
    pub aggregators: Value,
}

pub(crate) struct Worker<A: Algorithm> {
    index: usize,
    vertices: Vec<Vertex<A::Vertex, A::Edge>>,
    read: IncomingCache<A::Message>,
    write: Arc<IncomingCache<A::Message>>,
    format: Arc<dyn MessageFormat<A::Message>>,
    combiner: Option<Arc<dyn MessageCombiner<A::Message>>>,
    computation: BoxedComputation<A>,
    compensation: Option<BoxedCompensation<A>>,
    local_superstep: u64,
}

impl<A: Algorithm> Worker<A> {
    pub fn new(
        index: usize,
        algorithm: &A,
        vertices: Vec<Vertex<A::Vertex, A::Edge>>,
        write: Arc<IncomingCache<A::Message>>,
    ) -> Self {
        let format = algorithm.message_format();
        let combiner = algorithm.message_combiner();
        Self {
            index,
            vertices,
            read: IncomingCache::new(Arc::clone(&format), combiner.clone()),
            write,
            format,
            combiner,
            computation: algorithm.create_computation(),
            compensation: algorithm.create_compensation(),
            local_superstep: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Check if no vertex is active
    pub fn is_quiescent(&self) -> bool {
        self.vertices.iter().all(|v| !v.is_active())
    }

    /// Messages that arrived in the write cache during the last pass
    pub fn delivered_message_count(&self) -> usize {
        self.write.received_message_count()
    }

    /// Rotate caches at the barrier: clear the read cache, then swap
    pub fn rotate_caches(&mut self) {
        self.read.clear();
        self.write.swap_into(&mut self.read);
    }

    /// Drop every message held by this worker
    pub fn clear_caches(&mut self) {
        self.read.clear();
        self.write.clear();
    }

    /// Mark every vertex as awaiting compensation
    pub fn mark_lost(&mut self) {
        for vertex in &mut self.vertices {
            vertex.set_state(VertexState::InLostPartition);
        }
    }

    /// Activate vertices left in a lost partition once compensation is over
    pub fn finish_compensation(&mut self) {
        for vertex in &mut self.vertices {
            if vertex.state().is_in_lost_partition() {
                vertex.set_state(VertexState::Active);
            }
        }
    }

    /// Copy of the vertices for a checkpoint
    pub fn snapshot(&self) -> Vec<Vertex<A::Vertex, A::Edge>> {
        self.vertices.clone()
    }

    /// Write the result document of every vertex into `documents`
    pub fn collect_documents(
        &self,
        format: &dyn GraphFormat<A::Vertex, A::Edge>,
        documents: &mut BTreeMap<PregelId, Value>,
    ) {
        for vertex in &self.vertices {
            documents.insert(
                vertex.id().clone(),
                format.build_vertex_document(vertex.id(), &vertex.data),
            );
        }
    }

    /// Run one pass over all resident vertices
    pub fn run(&mut self, step: &StepContext<A>) -> Result<StepOutcome, PregelError> {
        let started = Instant::now();

        let mut global = AggregatorHandler::new(step.algorithm.aggregators());
        global.set_values(&step.aggregators)?;
        let local = RefCell::new(AggregatorHandler::new(step.algorithm.aggregators()));
        let outgoing = RefCell::new(OutgoingCache::new(
            self.index,
            step.shard_map,
            Arc::clone(&self.write),
            Arc::clone(&step.transport),
            Arc::clone(&self.format),
            self.combiner.clone(),
            step.batch_size,
        ));
        let info = SuperstepInfo {
            global_superstep: step.global_superstep,
            local_superstep: self.local_superstep,
            vertex_count: step.vertex_count,
            edge_count: step.edge_count,
        };

        let mut stats = WorkerStats {
            worker: self.index,
            vertex_count: self.vertices.len() as u64,
            ..WorkerStats::default()
        };

        match step.mode {
            StepMode::Compute => {
                for vertex in self.vertices.iter_mut() {
                    let shard = vertex.id().shard;
                    if vertex.state().is_halted() && self.read.has_messages(shard, vertex.id().key()) {
                        vertex.set_state(VertexState::Active);
                    }
                    if !vertex.is_active() {
                        continue;
                    }

                    let messages = self.read.get_messages(shard, vertex.id().key());
                    stats.received_count += messages.len() as u64;

                    let mut ctx = ComputeContext::new(vertex, &outgoing, &local, &global, info);
                    self.computation.compute(&mut ctx, messages);
                    let next = ctx.next_state();
                    vertex.set_state(next);

                    stats.computed_count += 1;
                    if next.is_active() {
                        stats.active_count += 1;
                    }
                }
                self.local_superstep += 1;
            }
            StepMode::Compensate => {
                let compensation = self.compensation.as_mut().ok_or_else(|| PregelError::PartitionLost {
                    worker: self.index,
                })?;
                for vertex in self.vertices.iter_mut() {
                    let state = vertex.state();
                    let mut ctx = ComputeContext::new(vertex, &outgoing, &local, &global, info);
                    compensation.compensate(&mut ctx, state.is_in_lost_partition());
                    stats.computed_count += 1;
                    if !state.is_halted() {
                        stats.active_count += 1;
                    }
                }
            }
        }

        stats.sent_count = outgoing.into_inner().finish()? as u64;
        stats.elapsed = started.elapsed();
        tracing::debug!(
            worker = self.index,
            superstep = step.global_superstep,
            mode = ?step.mode,
            computed = stats.computed_count,
            sent = stats.sent_count,
            "Worker pass finished"
        );

        let aggregators = local.into_inner().serialize_contributions();
        Ok(StepOutcome { stats, aggregators })
    }
}
