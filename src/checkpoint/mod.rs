//! Checkpointing of worker partitions
//!
//! A checkpoint captures the vertices of one worker at a superstep boundary.
//! When a partition is lost, the worker is rebuilt from its latest
//! checkpoint instead of reloading it from the graph, so vertices keep the
//! progress they had made before the loss.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             Checkpointer<V, E>           │
//! │     ┌──────────┐       ┌──────────┐      │
//! │     │  Memory  │       │   File   │      │
//! │     └──────────┘       └──────────┘      │
//! │           └────────┬────────┘            │
//! │                    ▼                     │
//! │       Checkpoint<V, E> (per worker)      │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let checkpointer = create_checkpointer::<u64, u64>(
//!     CheckpointerConfig::File { path: PathBuf::from("./checkpoints"), compression: true },
//!     job_id,
//! );
//! let conductor = Conductor::new(algorithm, graph, config)?.with_checkpointer(checkpointer);
//! ```

mod file;

pub use file::FileCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::PregelError;
use crate::vertex::Vertex;

/// The vertices of one worker at a superstep boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "V: Serialize, E: Serialize",
    deserialize = "V: DeserializeOwned, E: DeserializeOwned"
))]
pub struct Checkpoint<V, E> {
    /// Job the checkpoint belongs to
    pub job_id: String,

    /// Worker whose partition this is
    pub worker: usize,

    /// Last global superstep included in the snapshot
    pub superstep: u64,

    /// Vertex values, edges and states
    pub vertices: Vec<Vertex<V, E>>,

    /// When this checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Optional metadata for debugging or external tools
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl<V, E> Checkpoint<V, E> {
    /// Create a new checkpoint
    pub fn new(
        job_id: impl Into<String>,
        worker: usize,
        superstep: u64,
        vertices: Vec<Vertex<V, E>>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            worker,
            superstep,
            vertices,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to this checkpoint
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Durable storage for worker checkpoints
///
/// Checkpoints are addressed by worker and superstep.
#[async_trait]
pub trait Checkpointer<V, E>: Send + Sync
where
    V: Send + Sync,
    E: Send + Sync,
{
    /// Save a checkpoint.
    ///
    /// Implementations should ensure atomic writes to prevent corruption.
    async fn save(&self, checkpoint: &Checkpoint<V, E>) -> Result<(), PregelError>;

    /// Load the checkpoint of a worker at a superstep, if any
    async fn load(&self, worker: usize, superstep: u64) -> Result<Option<Checkpoint<V, E>>, PregelError>;

    /// Load the latest checkpoint of a worker, if any
    async fn latest(&self, worker: usize) -> Result<Option<Checkpoint<V, E>>, PregelError>;

    /// Supersteps checkpointed for a worker, sorted ascending
    async fn list(&self, worker: usize) -> Result<Vec<u64>, PregelError>;

    /// Delete a specific checkpoint
    async fn delete(&self, worker: usize, superstep: u64) -> Result<(), PregelError>;

    /// Keep only the most recent `keep` checkpoints of a worker
    async fn prune(&self, worker: usize, keep: usize) -> Result<usize, PregelError> {
        let checkpoints = self.list(worker).await?;
        let to_delete = checkpoints.len().saturating_sub(keep);
        let mut deleted = 0;

        for superstep in checkpoints.into_iter().take(to_delete) {
            self.delete(worker, superstep).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    /// Delete every checkpoint of a worker
    async fn clear(&self, worker: usize) -> Result<(), PregelError> {
        for superstep in self.list(worker).await? {
            self.delete(worker, superstep).await?;
        }
        Ok(())
    }
}

/// Configuration for creating checkpointers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointerConfig {
    /// In-memory checkpointing (not durable)
    #[default]
    Memory,

    /// File-based checkpointing
    File {
        /// Directory to store checkpoint files
        path: PathBuf,
        /// Whether to compress checkpoint data (uses zstd)
        #[serde(default)]
        compression: bool,
    },
}

/// In-memory checkpointer
///
/// Survives the loss of a worker partition, not of the process.
#[derive(Debug)]
pub struct MemoryCheckpointer<V, E> {
    checkpoints: tokio::sync::RwLock<HashMap<(usize, u64), Checkpoint<V, E>>>,
}

impl<V, E> MemoryCheckpointer<V, E> {
    pub fn new() -> Self {
        Self {
            checkpoints: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl<V, E> Default for MemoryCheckpointer<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V, E> Checkpointer<V, E> for MemoryCheckpointer<V, E>
where
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    async fn save(&self, checkpoint: &Checkpoint<V, E>) -> Result<(), PregelError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert((checkpoint.worker, checkpoint.superstep), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, worker: usize, superstep: u64) -> Result<Option<Checkpoint<V, E>>, PregelError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(&(worker, superstep)).cloned())
    }

    async fn latest(&self, worker: usize) -> Result<Option<Checkpoint<V, E>>, PregelError> {
        let checkpoints = self.checkpoints.read().await;
        let max_superstep = checkpoints
            .keys()
            .filter(|(w, _)| *w == worker)
            .map(|(_, superstep)| *superstep)
            .max();
        Ok(max_superstep.and_then(|superstep| checkpoints.get(&(worker, superstep)).cloned()))
    }

    async fn list(&self, worker: usize) -> Result<Vec<u64>, PregelError> {
        let checkpoints = self.checkpoints.read().await;
        let mut supersteps: Vec<u64> = checkpoints
            .keys()
            .filter(|(w, _)| *w == worker)
            .map(|(_, superstep)| *superstep)
            .collect();
        supersteps.sort_unstable();
        Ok(supersteps)
    }

    async fn delete(&self, worker: usize, superstep: u64) -> Result<(), PregelError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(&(worker, superstep));
        Ok(())
    }
}

/// Create a checkpointer from configuration
pub fn create_checkpointer<V, E>(
    config: CheckpointerConfig,
    job_id: impl AsRef<str>,
) -> Arc<dyn Checkpointer<V, E>>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    match config {
        CheckpointerConfig::Memory => Arc::new(MemoryCheckpointer::<V, E>::new()),
        CheckpointerConfig::File { path, compression } => {
            Arc::new(FileCheckpointer::new(path, job_id, compression))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{Edge, PregelId, VertexState};

    fn vertices() -> Vec<Vertex<u64, u64>> {
        let mut a = Vertex::new(PregelId::new(0, "a"), 3);
        a.add_edge(Edge::new(PregelId::new(1, "b"), 1));
        let mut b = Vertex::new(PregelId::new(1, "b"), 4);
        b.set_state(VertexState::Halted);
        vec![a, b]
    }

    fn checkpoint(worker: usize, superstep: u64) -> Checkpoint<u64, u64> {
        Checkpoint::new("test-job", worker, superstep, vertices())
    }

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = checkpoint(1, 5).with_metadata("algorithm", "sssp");

        assert_eq!(checkpoint.job_id, "test-job");
        assert_eq!(checkpoint.superstep, 5);
        assert!(!checkpoint.is_empty());
        assert_eq!(checkpoint.metadata.get("algorithm"), Some(&"sssp".to_string()));
    }

    #[test]
    fn test_checkpoint_serialization() {
        let json = serde_json::to_string(&checkpoint(0, 2)).unwrap();
        let back: Checkpoint<u64, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vertices, vertices());
    }

    #[tokio::test]
    async fn test_memory_checkpointer_save_load() {
        let checkpointer = MemoryCheckpointer::<u64, u64>::new();
        checkpointer.save(&checkpoint(0, 5)).await.unwrap();

        let loaded = checkpointer.load(0, 5).await.unwrap().unwrap();
        assert_eq!(loaded.superstep, 5);
        assert!(checkpointer.load(1, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_checkpointer_latest_per_worker() {
        let checkpointer = MemoryCheckpointer::<u64, u64>::new();
        for (worker, superstep) in [(0, 1), (0, 5), (0, 3), (1, 9)] {
            checkpointer.save(&checkpoint(worker, superstep)).await.unwrap();
        }

        assert_eq!(checkpointer.latest(0).await.unwrap().unwrap().superstep, 5);
        assert_eq!(checkpointer.latest(1).await.unwrap().unwrap().superstep, 9);
        assert!(checkpointer.latest(2).await.unwrap().is_none());
        assert_eq!(checkpointer.list(0).await.unwrap(), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_memory_checkpointer_prune_and_clear() {
        let checkpointer = MemoryCheckpointer::<u64, u64>::new();
        for superstep in 1..=5 {
            checkpointer.save(&checkpoint(0, superstep)).await.unwrap();
        }
        checkpointer.save(&checkpoint(1, 1)).await.unwrap();

        assert_eq!(checkpointer.prune(0, 2).await.unwrap(), 3);
        assert_eq!(checkpointer.list(0).await.unwrap(), vec![4, 5]);

        checkpointer.clear(0).await.unwrap();
        assert!(checkpointer.list(0).await.unwrap().is_empty());
        assert_eq!(checkpointer.list(1).await.unwrap(), vec![1]);
    }

    #[test]
    fn test_checkpointer_config() {
        assert!(matches!(CheckpointerConfig::default(), CheckpointerConfig::Memory));

        let config: CheckpointerConfig =
            serde_json::from_str(r#"{"kind": "file", "path": "/tmp/ckpt"}"#).unwrap();
        match config {
            CheckpointerConfig::File { path, compression } => {
                assert_eq!(path, PathBuf::from("/tmp/ckpt"));
                assert!(!compression);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
