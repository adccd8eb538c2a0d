//! Outgoing message cache

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::IncomingCache;
use crate::combiner::MessageCombiner;
use crate::error::PregelError;
use crate::format::MessageFormat;
use crate::transport::{ShardMap, Transport};
use crate::vertex::{PregelId, ShardId};

/// Send buffer of one worker for one superstep (or compensation round)
///
/// Messages for shards owned by the same worker go straight into its write
/// cache. Remote messages are buffered per shard and flushed through the
/// transport once `batch_size` of them are buffered. Sending never fails;
/// the first delivery error is kept and returned by [`finish`](Self::finish).
pub struct OutgoingCache<M> {
    worker: usize,
    shard_map: ShardMap,
    local: Arc<IncomingCache<M>>,
    transport: Arc<dyn Transport>,
    format: Arc<dyn MessageFormat<M>>,
    combiner: Option<Arc<dyn MessageCombiner<M>>>,
    batch_size: usize,
    buffer: HashMap<ShardId, HashMap<String, Vec<M>>>,
    buffered: usize,
    send_count: usize,
    error: Option<PregelError>,
}

impl<M> OutgoingCache<M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker: usize,
        shard_map: ShardMap,
        local: Arc<IncomingCache<M>>,
        transport: Arc<dyn Transport>,
        format: Arc<dyn MessageFormat<M>>,
        combiner: Option<Arc<dyn MessageCombiner<M>>>,
        batch_size: usize,
    ) -> Self {
        Self {
            worker,
            shard_map,
            local,
            transport,
            format,
            combiner,
            batch_size: batch_size.max(1),
            buffer: HashMap::new(),
            buffered: 0,
            send_count: 0,
            error: None,
        }
    }

    /// Number of messages sent so far
    pub fn send_count(&self) -> usize {
        self.send_count
    }

    /// Send a message to `target`, to be read in the next superstep
    pub fn send_message(&mut self, target: &PregelId, message: M) {
        self.send_count += 1;
        if self.shard_map.owns(self.worker, target.shard) {
            self.local.set_direct(target.shard, target.key(), message);
            return;
        }

        let keys = self.buffer.entry(target.shard).or_default();
        if let Some(bag) = keys.get_mut(target.key()) {
            match (self.combiner.as_deref(), bag.first_mut()) {
                (Some(combiner), Some(existing)) => combiner.combine(existing, message),
                _ => bag.push(message),
            }
        } else {
            keys.insert(target.key.clone(), vec![message]);
        }

        self.buffered += 1;
        if self.buffered >= self.batch_size {
            self.flush();
        }
    }

    /// Encode and deliver every buffered message, one batch per shard
    pub fn flush(&mut self) {
        self.buffered = 0;
        for (shard, keys) in std::mem::take(&mut self.buffer) {
            let result = self
                .encode_batch(shard, keys)
                .and_then(|batch| self.transport.deliver(shard, batch));
            if let Err(e) = result {
                tracing::warn!(worker = self.worker, shard, error = %e, "Batch delivery failed");
                self.error.get_or_insert(e);
            }
        }
    }

    fn encode_batch(&self, shard: ShardId, keys: HashMap<String, Vec<M>>) -> Result<Value, PregelError> {
        let mut entries = Vec::with_capacity(keys.len() * 2);
        for (key, bag) in keys {
            let payloads = bag
                .iter()
                .map(|message| self.format.add_value(message))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push(Value::String(key));
            entries.push(Value::Array(payloads));
        }
        Ok(json!({ "shard": shard, "messages": entries }))
    }

    /// Flush the remaining messages; returns the send count or the first error
    pub fn finish(mut self) -> Result<usize, PregelError> {
        self.flush();
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self.send_count),
        }
    }
}
