//! Single-source shortest paths
//!
//! Every vertex keeps the length of the shortest known path from the source
//! (`u64::MAX` while unreachable). Only the source starts active; a vertex
//! that learns a shorter distance forwards it along its out-edges and halts.
//!
//! Edge documents carry the weight either as a plain number or as
//! `{"weight": n}`; edges without data weigh 1. Result documents are
//! `{"distance": n}`, with `null` for unreachable vertices.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::algorithm::{Algorithm, BoxedCompensation, BoxedComputation};
use crate::cache::MessageIterator;
use crate::combiner::{MessageCombiner, MinCombiner};
use crate::computation::{ComputeContext, VertexCompensation, VertexComputation};
use crate::error::PregelError;
use crate::format::GraphFormat;
use crate::vertex::PregelId;

const UNREACHABLE: u64 = u64::MAX;

/// Shortest path lengths from one source vertex
#[derive(Debug, Clone)]
pub struct ShortestPath {
    source: PregelId,
}

impl ShortestPath {
    pub fn new(source: PregelId) -> Self {
        Self { source }
    }

    /// Build from job parameters of the form `{"source": "shard/key"}`
    pub fn from_params(params: &Value) -> Result<Self, PregelError> {
        let source = params
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| PregelError::invalid_parameter("sssp requires a \"source\" vertex id"))?;
        Ok(Self::new(source.parse()?))
    }

    pub fn source(&self) -> &PregelId {
        &self.source
    }
}

impl Algorithm for ShortestPath {
    type Vertex = u64;
    type Edge = u64;
    type Message = u64;

    fn name(&self) -> &str {
        "sssp"
    }

    fn graph_format(&self) -> Arc<dyn GraphFormat<u64, u64>> {
        Arc::new(DistanceFormat)
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<u64>>> {
        Some(Arc::new(MinCombiner))
    }

    fn create_computation(&self) -> BoxedComputation<Self> {
        Box::new(Relax {
            source: self.source.clone(),
        })
    }

    fn create_compensation(&self) -> Option<BoxedCompensation<Self>> {
        Some(Box::new(Rebroadcast {
            source: self.source.clone(),
        }))
    }

    fn initial_active(&self, id: &PregelId, _data: &u64) -> bool {
        *id == self.source
    }
}

struct DistanceFormat;

impl GraphFormat<u64, u64> for DistanceFormat {
    fn copy_vertex_data(&self, _id: &PregelId, _document: &Value) -> Result<u64, PregelError> {
        Ok(UNREACHABLE)
    }

    fn copy_edge_data(&self, document: &Value) -> Result<u64, PregelError> {
        let weight = match document {
            Value::Null => return Ok(1),
            Value::Object(fields) => fields.get("weight").unwrap_or(&Value::Null),
            other => other,
        };
        match weight {
            Value::Null => Ok(1),
            w => w
                .as_u64()
                .ok_or_else(|| PregelError::graph_load(format!("invalid edge weight {}", w))),
        }
    }

    fn build_vertex_document(&self, _id: &PregelId, distance: &u64) -> Value {
        if *distance == UNREACHABLE {
            json!({ "distance": null })
        } else {
            json!({ "distance": distance })
        }
    }
}

fn broadcast(ctx: &ComputeContext<'_, u64, u64, u64>, distance: u64) {
    for edge in ctx.edges() {
        ctx.send_message(edge.target(), distance.saturating_add(edge.data));
    }
}

struct Relax {
    source: PregelId,
}

impl VertexComputation<u64, u64, u64> for Relax {
    fn compute(&mut self, ctx: &mut ComputeContext<'_, u64, u64, u64>, messages: MessageIterator<'_, u64>) {
        let mut candidate = messages.copied().min().unwrap_or(UNREACHABLE);
        if *ctx.id() == self.source {
            candidate = 0;
        }
        if candidate < *ctx.vertex_data() {
            *ctx.mutable_vertex_data() = candidate;
            broadcast(ctx, candidate);
        }
        ctx.vote_halt();
    }
}

/// Resets lost vertices and re-sends every known distance
struct Rebroadcast {
    source: PregelId,
}

impl VertexCompensation<u64, u64, u64> for Rebroadcast {
    fn compensate(&mut self, ctx: &mut ComputeContext<'_, u64, u64, u64>, in_lost_partition: bool) {
        if in_lost_partition {
            let reset = if *ctx.id() == self.source { 0 } else { UNREACHABLE };
            *ctx.mutable_vertex_data() = reset;
        }
        let distance = *ctx.vertex_data();
        if distance != UNREACHABLE {
            broadcast(ctx, distance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params() {
        let sssp = ShortestPath::from_params(&json!({"source": "0/a"})).unwrap();
        assert_eq!(sssp.source(), &PregelId::new(0, "a"));

        let err = ShortestPath::from_params(&json!({})).unwrap_err();
        assert!(matches!(err, PregelError::InvalidParameter(_)));
        assert!(ShortestPath::from_params(&json!({"source": "nope"})).is_err());
    }

    #[test]
    fn test_edge_weights() {
        let format = DistanceFormat;
        assert_eq!(format.copy_edge_data(&Value::Null).unwrap(), 1);
        assert_eq!(format.copy_edge_data(&json!(4)).unwrap(), 4);
        assert_eq!(format.copy_edge_data(&json!({"weight": 9})).unwrap(), 9);
        assert_eq!(format.copy_edge_data(&json!({"label": "x"})).unwrap(), 1);
        assert!(format.copy_edge_data(&json!(-2)).is_err());
        assert!(format.copy_edge_data(&json!("heavy")).is_err());
    }

    #[test]
    fn test_vertex_documents() {
        let format = DistanceFormat;
        let id = PregelId::new(0, "a");
        assert_eq!(format.copy_vertex_data(&id, &json!({"name": "a"})).unwrap(), UNREACHABLE);
        assert_eq!(format.build_vertex_document(&id, &3), json!({"distance": 3}));
        assert_eq!(
            format.build_vertex_document(&id, &UNREACHABLE),
            json!({"distance": null})
        );
    }

    #[test]
    fn test_only_source_starts_active() {
        let sssp = ShortestPath::new(PregelId::new(0, "a"));
        assert!(sssp.initial_active(&PregelId::new(0, "a"), &UNREACHABLE));
        assert!(!sssp.initial_active(&PregelId::new(1, "a"), &UNREACHABLE));
    }
}
