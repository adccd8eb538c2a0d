//! In-memory document graph
//!
//! The graph a job runs on. Vertex and edge payloads are opaque JSON
//! documents; the algorithm's [`GraphFormat`] turns them into typed values
//! when a worker loads its partition.
//!
//! ```json
//! {
//!   "vertices": [{"shard": 0, "key": "a", "data": {}}],
//!   "edges": [{"from": "0/a", "to": "1/b", "data": {"weight": 3}}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::error::PregelError;
use crate::format::GraphFormat;
use crate::transport::ShardMap;
use crate::vertex::{Edge, PregelId, ShardId, Vertex};

/// A stored vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexDocument {
    pub shard: ShardId,
    pub key: String,
    #[serde(default)]
    pub data: Value,
}

impl VertexDocument {
    pub fn id(&self) -> PregelId {
        PregelId::new(self.shard, self.key.clone())
    }
}

/// A stored directed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub from: PregelId,
    pub to: PregelId,
    #[serde(default)]
    pub data: Value,
}

/// Vertex and edge documents of a whole graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub vertices: Vec<VertexDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a graph from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PregelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PregelError::graph_load(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| PregelError::graph_load(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Add a vertex and return its id
    pub fn add_vertex(&mut self, shard: ShardId, key: impl Into<String>, data: Value) -> PregelId {
        let key = key.into();
        let id = PregelId::new(shard, key.clone());
        self.vertices.push(VertexDocument { shard, key, data });
        id
    }

    /// Add a directed edge
    pub fn add_edge(&mut self, from: &PregelId, to: &PregelId, data: Value) {
        self.edges.push(EdgeDocument {
            from: from.clone(),
            to: to.clone(),
            data,
        });
    }

    /// Add one edge in each direction, both carrying `data`
    pub fn add_undirected_edge(&mut self, a: &PregelId, b: &PregelId, data: Value) {
        self.add_edge(a, b, data.clone());
        self.add_edge(b, a, data);
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Build the vertices owned by `worker`, with their outgoing edges
    ///
    /// Fails on duplicate vertex ids, on edges whose source vertex does not
    /// exist and on documents the format rejects.
    pub fn load_partition<V, E>(
        &self,
        format: &dyn GraphFormat<V, E>,
        shard_map: ShardMap,
        worker: usize,
    ) -> Result<Vec<Vertex<V, E>>, PregelError> {
        let mut vertices = Vec::new();
        let mut index: HashMap<PregelId, usize> = HashMap::new();

        for document in &self.vertices {
            if !shard_map.owns(worker, document.shard) {
                continue;
            }
            let id = document.id();
            if index.contains_key(&id) {
                return Err(PregelError::graph_load(format!("duplicate vertex {}", id)));
            }
            let data = format.copy_vertex_data(&id, &document.data)?;
            index.insert(id.clone(), vertices.len());
            vertices.push(Vertex::new(id, data));
        }

        for document in &self.edges {
            if !shard_map.owns(worker, document.from.shard) {
                continue;
            }
            let position = *index.get(&document.from).ok_or_else(|| {
                PregelError::graph_load(format!(
                    "edge {} -> {} has no source vertex",
                    document.from, document.to
                ))
            })?;
            let data = format.copy_edge_data(&document.data)?;
            vertices[position].add_edge(Edge::new(document.to.clone(), data));
        }

        Ok(vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::JsonGraphFormat;
    use serde_json::json;

    fn triangle() -> Graph {
        let mut graph = Graph::new();
        let a = graph.add_vertex(0, "a", json!(1));
        let b = graph.add_vertex(1, "b", json!(2));
        let c = graph.add_vertex(2, "c", Value::Null);
        graph.add_edge(&a, &b, json!(5));
        graph.add_undirected_edge(&b, &c, json!(7));
        graph
    }

    #[test]
    fn test_builders() {
        let graph = triangle();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.edges[2].from, PregelId::new(2, "c"));
    }

    #[test]
    fn test_load_partition() {
        let graph = triangle();
        let format = JsonGraphFormat::<u64, u64>::new();
        let shard_map = ShardMap::new(2);

        let worker0 = graph.load_partition::<u64, u64>(&format, shard_map, 0).unwrap();
        let ids: Vec<_> = worker0.iter().map(|v| v.id().to_string()).collect();
        assert_eq!(ids, vec!["0/a", "2/c"]);
        assert_eq!(worker0[0].edges()[0].data, 5);
        assert_eq!(worker0[1].data, 0);
        assert_eq!(worker0[1].edges()[0].target(), &PregelId::new(1, "b"));

        let worker1 = graph.load_partition::<u64, u64>(&format, shard_map, 1).unwrap();
        assert_eq!(worker1.len(), 1);
        assert_eq!(worker1[0].edge_count(), 1);
    }

    #[test]
    fn test_edge_without_source_fails() {
        let mut graph = triangle();
        graph.add_edge(&PregelId::new(0, "ghost"), &PregelId::new(0, "a"), Value::Null);
        let format = JsonGraphFormat::<u64, u64>::new();
        let err = graph.load_partition::<u64, u64>(&format, ShardMap::new(1), 0).unwrap_err();
        assert!(matches!(err, PregelError::GraphLoad(_)));
    }

    #[test]
    fn test_duplicate_vertex_fails() {
        let mut graph = triangle();
        graph.add_vertex(0, "a", Value::Null);
        let format = JsonGraphFormat::<u64, u64>::new();
        assert!(graph.load_partition::<u64, u64>(&format, ShardMap::new(1), 0).is_err());
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"vertices": [{"shard": 0, "key": "x"}], "edges": [{"from": "0/x", "to": "0/x"}]}"#,
        )
        .unwrap();

        let graph = Graph::from_json_file(&path).unwrap();
        assert_eq!(graph.vertices[0].data, Value::Null);
        assert_eq!(graph.edges[0].to, PregelId::new(0, "x"));
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = Graph::from_json_file("/nonexistent/graph.json").unwrap_err();
        assert!(matches!(err, PregelError::GraphLoad(_)));
    }
}
