//! Per-vertex compute contract
//!
//! Algorithms implement [`VertexComputation`]. The engine calls
//! [`compute`](VertexComputation::compute) once per active vertex per
//! superstep, handing it a [`ComputeContext`] bound to that vertex and the
//! messages sent to it during the previous superstep.
//!
//! # Example
//!
//! ```ignore
//! impl VertexComputation<u64, u64, u64> for MaxValue {
//!     fn compute(&mut self, ctx: &mut ComputeContext<'_, u64, u64, u64>, messages: MessageIterator<'_, u64>) {
//!         let best = messages.copied().max().unwrap_or(0);
//!         if best > *ctx.vertex_data() || ctx.global_superstep() == 0 {
//!             *ctx.mutable_vertex_data() = best.max(*ctx.vertex_data());
//!             ctx.send_message_to_all_neighbours(*ctx.vertex_data());
//!         }
//!         ctx.vote_halt();
//!     }
//! }
//! ```

use std::any::Any;
use std::cell::RefCell;

use crate::aggregator::AggregatorHandler;
use crate::cache::{MessageIterator, OutgoingCache};
use crate::vertex::{Edge, PregelId, Vertex, VertexState};

/// Superstep facts shared by every vertex of one worker pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperstepInfo {
    pub global_superstep: u64,
    /// Supersteps run by this worker since it was (re)built
    pub local_superstep: u64,
    /// Vertices in the whole graph
    pub vertex_count: u64,
    /// Edges in the whole graph
    pub edge_count: u64,
}

/// Everything a vertex may touch while it computes
///
/// Sending and aggregating take `&self`, so they can be used while
/// iterating [`edges`](Self::edges).
pub struct ComputeContext<'a, V, E, M> {
    vertex: &'a mut Vertex<V, E>,
    outgoing: &'a RefCell<OutgoingCache<M>>,
    local_aggregators: &'a RefCell<AggregatorHandler>,
    global_aggregators: &'a AggregatorHandler,
    info: SuperstepInfo,
    halt: bool,
}

impl<'a, V, E, M> ComputeContext<'a, V, E, M> {
    pub(crate) fn new(
        vertex: &'a mut Vertex<V, E>,
        outgoing: &'a RefCell<OutgoingCache<M>>,
        local_aggregators: &'a RefCell<AggregatorHandler>,
        global_aggregators: &'a AggregatorHandler,
        info: SuperstepInfo,
    ) -> Self {
        Self {
            vertex,
            outgoing,
            local_aggregators,
            global_aggregators,
            info,
            halt: false,
        }
    }

    /// State the vertex leaves the superstep in
    pub(crate) fn next_state(&self) -> VertexState {
        if self.halt {
            VertexState::Halted
        } else {
            VertexState::Active
        }
    }

    pub fn id(&self) -> &PregelId {
        self.vertex.id()
    }

    pub fn vertex_data(&self) -> &V {
        &self.vertex.data
    }

    pub fn mutable_vertex_data(&mut self) -> &mut V {
        &mut self.vertex.data
    }

    pub fn edges(&self) -> &[Edge<E>] {
        self.vertex.edges()
    }

    /// Edge values are writable; targets are not
    pub fn edges_mut(&mut self) -> &mut [Edge<E>] {
        self.vertex.edges_mut()
    }

    /// Send a message, delivered at the start of the next superstep
    pub fn send_message(&self, target: &PregelId, message: M) {
        self.outgoing.borrow_mut().send_message(target, message);
    }

    /// Send the same message along every outgoing edge
    pub fn send_message_to_all_neighbours(&self, message: M)
    where
        M: Clone,
    {
        let mut outgoing = self.outgoing.borrow_mut();
        for edge in self.vertex.edges() {
            outgoing.send_message(edge.target(), message.clone());
        }
    }

    /// Stop computing until a message arrives
    pub fn vote_halt(&mut self) {
        self.halt = true;
    }

    /// Compute again in the next superstep (the default)
    pub fn vote_active(&mut self) {
        self.halt = false;
    }

    pub fn global_superstep(&self) -> u64 {
        self.info.global_superstep
    }

    pub fn local_superstep(&self) -> u64 {
        self.info.local_superstep
    }

    /// Number of vertices in the whole graph
    pub fn vertex_count(&self) -> u64 {
        self.info.vertex_count
    }

    /// Number of edges in the whole graph
    pub fn edge_count(&self) -> u64 {
        self.info.edge_count
    }

    /// Global aggregator value as of the last merge
    ///
    /// `None` if the name is not registered or `T` is not its value type.
    pub fn aggregated_value<T: Any>(&self, name: &str) -> Option<&T> {
        self.global_aggregators.aggregated_value(name)
    }

    /// Contribute to an aggregator; visible to everyone next superstep
    pub fn aggregate<T: Any>(&self, name: &str, value: &T) {
        self.local_aggregators.borrow_mut().aggregate(name, value);
    }
}

/// Per-vertex algorithm, instantiated once per worker
pub trait VertexComputation<V, E, M>: Send {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, V, E, M>, messages: MessageIterator<'_, M>);
}

/// Runs instead of [`VertexComputation`] while recovering from a lost partition
///
/// `in_lost_partition` is true for vertices that were restored and lost
/// their progress.
pub trait VertexCompensation<V, E, M>: Send {
    fn compensate(&mut self, ctx: &mut ComputeContext<'_, V, E, M>, in_lost_partition: bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AggregatorRegistration, SumAggregator};
    use crate::cache::IncomingCache;
    use crate::format::JsonMessageFormat;
    use crate::transport::{InProcessTransport, ShardMap};
    use std::sync::Arc;

    struct Fixture {
        vertex: Vertex<u64, u64>,
        local: Arc<IncomingCache<u64>>,
        outgoing: RefCell<OutgoingCache<u64>>,
        local_aggs: RefCell<AggregatorHandler>,
        global_aggs: AggregatorHandler,
    }

    fn fixture() -> Fixture {
        let mut vertex = Vertex::new(PregelId::new(0, "a"), 1);
        vertex.add_edge(Edge::new(PregelId::new(0, "b"), 10));
        vertex.add_edge(Edge::new(PregelId::new(0, "c"), 20));

        let local = Arc::new(IncomingCache::<u64>::new(Arc::new(JsonMessageFormat::<u64>::new()), None));
        let shard_map = ShardMap::new(1);
        let outgoing = OutgoingCache::new(
            0,
            shard_map,
            Arc::clone(&local),
            Arc::new(InProcessTransport::new(vec![Arc::clone(&local)], shard_map)),
            Arc::new(JsonMessageFormat::<u64>::new()),
            None,
            16,
        );
        let registrations =
            || vec![AggregatorRegistration::transient("sum", SumAggregator::<u64>::new())];
        let mut global_aggs = AggregatorHandler::new(registrations());
        global_aggs.aggregate("sum", &7u64);

        Fixture {
            vertex,
            local,
            outgoing: RefCell::new(outgoing),
            local_aggs: RefCell::new(AggregatorHandler::new(registrations())),
            global_aggs,
        }
    }

    const INFO: SuperstepInfo = SuperstepInfo {
        global_superstep: 3,
        local_superstep: 1,
        vertex_count: 3,
        edge_count: 2,
    };

    #[test]
    fn test_context_accessors() {
        let mut f = fixture();
        let mut ctx = ComputeContext::new(&mut f.vertex, &f.outgoing, &f.local_aggs, &f.global_aggs, INFO);

        assert_eq!(ctx.id(), &PregelId::new(0, "a"));
        assert_eq!(ctx.global_superstep(), 3);
        assert_eq!(ctx.local_superstep(), 1);
        assert_eq!(ctx.vertex_count(), 3);
        *ctx.mutable_vertex_data() += 4;
        assert_eq!(*ctx.vertex_data(), 5);

        ctx.edges_mut()[1].data = 21;
        assert_eq!(ctx.edges()[1].data, 21);
    }

    #[test]
    fn test_send_while_iterating_edges() {
        let mut f = fixture();
        {
            let ctx = ComputeContext::new(&mut f.vertex, &f.outgoing, &f.local_aggs, &f.global_aggs, INFO);
            for edge in ctx.edges() {
                ctx.send_message(edge.target(), edge.data);
            }
            ctx.send_message_to_all_neighbours(1);
        }
        assert_eq!(f.outgoing.into_inner().finish().unwrap(), 4);
        assert_eq!(f.local.received_message_count(), 4);
    }

    #[test]
    fn test_votes() {
        let mut f = fixture();
        let mut ctx = ComputeContext::new(&mut f.vertex, &f.outgoing, &f.local_aggs, &f.global_aggs, INFO);
        assert_eq!(ctx.next_state(), VertexState::Active);
        ctx.vote_halt();
        assert_eq!(ctx.next_state(), VertexState::Halted);
        ctx.vote_active();
        assert_eq!(ctx.next_state(), VertexState::Active);
    }

    #[test]
    fn test_aggregators_read_global_write_local() {
        let mut f = fixture();
        {
            let ctx = ComputeContext::new(&mut f.vertex, &f.outgoing, &f.local_aggs, &f.global_aggs, INFO);
            ctx.aggregate("sum", &2u64);
            assert_eq!(ctx.aggregated_value::<u64>("sum"), Some(&7));
            assert_eq!(ctx.aggregated_value::<u64>("unknown"), None);
        }
        assert_eq!(f.local_aggs.borrow().aggregated_value::<u64>("sum"), Some(&2));
    }
}
