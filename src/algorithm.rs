//! Algorithm plug-in interface
//!
//! An [`Algorithm`] is resolved once when a job is constructed. It fixes the
//! vertex, edge and message types and provides the factories the engine
//! needs: per-worker computations, the optional compensation and master
//! context, formats, combiner and aggregators.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::aggregator::AggregatorRegistration;
use crate::combiner::MessageCombiner;
use crate::computation::{VertexCompensation, VertexComputation};
use crate::format::{GraphFormat, JsonMessageFormat, MessageFormat};
use crate::master::MasterContext;
use crate::vertex::PregelId;

/// Boxed per-worker computation of an algorithm
pub type BoxedComputation<A> = Box<
    dyn VertexComputation<
        <A as Algorithm>::Vertex,
        <A as Algorithm>::Edge,
        <A as Algorithm>::Message,
    >,
>;

/// Boxed per-worker compensation of an algorithm
pub type BoxedCompensation<A> = Box<
    dyn VertexCompensation<
        <A as Algorithm>::Vertex,
        <A as Algorithm>::Edge,
        <A as Algorithm>::Message,
    >,
>;

/// A vertex-centric graph algorithm
pub trait Algorithm: Sized + Send + Sync + 'static {
    type Vertex: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Edge: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Message: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Name used in logs and results
    fn name(&self) -> &str;

    /// Storage format for vertex and edge documents
    fn graph_format(&self) -> Arc<dyn GraphFormat<Self::Vertex, Self::Edge>>;

    /// Wire format for messages
    fn message_format(&self) -> Arc<dyn MessageFormat<Self::Message>> {
        Arc::new(JsonMessageFormat::new())
    }

    /// Combiner for messages to the same vertex; `None` keeps every message
    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<Self::Message>>> {
        None
    }

    /// Create the computation run by one worker
    fn create_computation(&self) -> BoxedComputation<Self>;

    /// Create the compensation run by one worker after a partition loss
    ///
    /// Algorithms returning `None` fail the job when a partition is lost.
    fn create_compensation(&self) -> Option<BoxedCompensation<Self>> {
        None
    }

    /// Create the master context, if the algorithm has coordinator hooks
    fn master_context(&self) -> Option<Box<dyn MasterContext>> {
        None
    }

    /// Aggregators used by the algorithm
    ///
    /// Called once per scope (master and each worker pass), so every call
    /// must return fresh aggregators.
    fn aggregators(&self) -> Vec<AggregatorRegistration> {
        Vec::new()
    }

    /// Whether a vertex is active in superstep 0
    fn initial_active(&self, _id: &PregelId, _data: &Self::Vertex) -> bool {
        true
    }
}
