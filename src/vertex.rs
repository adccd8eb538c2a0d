//! Vertex and edge types
//!
//! A vertex is addressed by its shard and key. It owns its algorithm value,
//! its outgoing edges and its vote (Pregel's "vote to halt" mechanism).

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PregelError;

/// Identifier of a graph shard; shards are distributed over workers
pub type ShardId = u32;

/// Unique identifier of a vertex: the shard it lives in plus its key
///
/// Serialized as the string `"shard/key"`, so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PregelId {
    pub shard: ShardId,
    pub key: String,
}

impl PregelId {
    /// Create a new PregelId
    pub fn new(shard: ShardId, key: impl Into<String>) -> Self {
        Self {
            shard,
            key: key.into(),
        }
    }

    /// Get the key as a string slice
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for PregelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard, self.key)
    }
}

impl FromStr for PregelId {
    type Err = PregelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (shard, key) = s
            .split_once('/')
            .ok_or_else(|| PregelError::invalid_parameter(format!("'{}' is not shard/key", s)))?;
        let shard = shard
            .parse()
            .map_err(|_| PregelError::invalid_parameter(format!("bad shard in '{}'", s)))?;
        if key.is_empty() {
            return Err(PregelError::invalid_parameter(format!("empty key in '{}'", s)));
        }
        Ok(Self::new(shard, key))
    }
}

impl Serialize for PregelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PregelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Vertex execution state
///
/// - `Active`: vertex computes in the next superstep
/// - `Halted`: vertex voted to halt (reactivated when a message arrives)
/// - `InLostPartition`: vertex was restored after its partition was lost
///   and waits for compensation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VertexState {
    #[default]
    Active,
    Halted,
    InLostPartition,
}

impl VertexState {
    /// Check if the vertex is active
    pub fn is_active(&self) -> bool {
        matches!(self, VertexState::Active)
    }

    /// Check if the vertex is halted (can be reactivated)
    pub fn is_halted(&self) -> bool {
        matches!(self, VertexState::Halted)
    }

    /// Check if the vertex awaits compensation
    pub fn is_in_lost_partition(&self) -> bool {
        matches!(self, VertexState::InLostPartition)
    }
}

/// A directed edge, owned by its source vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<E> {
    target: PregelId,
    /// Algorithm value of the edge; writable by the owning vertex
    pub data: E,
}

impl<E> Edge<E> {
    /// Create a new edge
    pub fn new(target: PregelId, data: E) -> Self {
        Self { target, data }
    }

    /// Target vertex of this edge
    pub fn target(&self) -> &PregelId {
        &self.target
    }
}

/// A vertex resident on one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex<V, E> {
    id: PregelId,
    /// Algorithm value of the vertex
    pub data: V,
    edges: Vec<Edge<E>>,
    state: VertexState,
}

impl<V, E> Vertex<V, E> {
    /// Create a new active vertex without edges
    pub fn new(id: PregelId, data: V) -> Self {
        Self {
            id,
            data,
            edges: Vec::new(),
            state: VertexState::Active,
        }
    }

    pub fn id(&self) -> &PregelId {
        &self.id
    }

    pub fn state(&self) -> VertexState {
        self.state
    }

    pub fn set_state(&mut self, state: VertexState) {
        self.state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn add_edge(&mut self, edge: Edge<E>) {
        self.edges.push(edge);
    }

    pub fn edges(&self) -> &[Edge<E>] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [Edge<E>] {
        &mut self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
