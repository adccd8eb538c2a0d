//! Batch delivery between workers
//!
//! Workers exchange remote messages as JSON batches (see
//! [`IncomingCache::parse_messages`](crate::cache::IncomingCache::parse_messages)).
//! [`Transport`] hands a batch to the worker owning its shard;
//! [`InProcessTransport`] does so inside one process.

use serde_json::Value;
use std::sync::Arc;

use crate::cache::IncomingCache;
use crate::error::PregelError;
use crate::vertex::ShardId;

/// Assignment of shards to workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardMap {
    num_workers: usize,
}

impl ShardMap {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Worker that owns `shard`
    pub fn worker_for(&self, shard: ShardId) -> usize {
        shard as usize % self.num_workers
    }

    /// Check if `worker` owns `shard`
    pub fn owns(&self, worker: usize, shard: ShardId) -> bool {
        self.worker_for(shard) == worker
    }
}

/// Delivers message batches to the worker owning a shard
///
/// Called from worker compute threads, so delivery is synchronous.
pub trait Transport: Send + Sync {
    fn deliver(&self, shard: ShardId, batch: Value) -> Result<(), PregelError>;
}

/// Transport between workers of one process
///
/// Batches are parsed straight into the owning worker's write cache.
pub struct InProcessTransport<M> {
    caches: Vec<Arc<IncomingCache<M>>>,
    shard_map: ShardMap,
}

impl<M> InProcessTransport<M> {
    /// Create a transport over the write caches of all workers, in worker order
    pub fn new(caches: Vec<Arc<IncomingCache<M>>>, shard_map: ShardMap) -> Self {
        Self { caches, shard_map }
    }
}

impl<M: Send> Transport for InProcessTransport<M> {
    fn deliver(&self, shard: ShardId, batch: Value) -> Result<(), PregelError> {
        let worker = self.shard_map.worker_for(shard);
        let cache = self.caches.get(worker).ok_or_else(|| {
            PregelError::transport(format!("no worker {} for shard {}", worker, shard))
        })?;
        cache.parse_messages(&batch)?;
        Ok(())
    }
}
