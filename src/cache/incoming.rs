//! Incoming message cache

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::MessageIterator;
use crate::combiner::MessageCombiner;
use crate::error::PregelError;
use crate::format::MessageFormat;
use crate::vertex::ShardId;

/// Bags of one cache, plus the number of arrivals since the last clear
///
/// In combining mode every bag holds at most one message.
struct MessageStore<M> {
    bags: HashMap<ShardId, HashMap<String, Vec<M>>>,
    received: usize,
}

impl<M> Default for MessageStore<M> {
    fn default() -> Self {
        Self {
            bags: HashMap::new(),
            received: 0,
        }
    }
}

impl<M> MessageStore<M> {
    fn insert(&mut self, combiner: Option<&dyn MessageCombiner<M>>, shard: ShardId, key: &str, message: M) {
        let keys = self.bags.entry(shard).or_default();
        if let Some(bag) = keys.get_mut(key) {
            match (combiner, bag.first_mut()) {
                (Some(combiner), Some(existing)) => combiner.combine(existing, message),
                _ => bag.push(message),
            }
        } else {
            keys.insert(key.to_string(), vec![message]);
        }
    }
}

/// Per-worker mailbox for one superstep
///
/// Producers (local vertices and other workers' flushes) write concurrently
/// through `&self`; all writes go through one mutex. The compute pass reads
/// the frozen read cache through `&mut self` without locking.
pub struct IncomingCache<M> {
    store: Mutex<MessageStore<M>>,
    format: Arc<dyn MessageFormat<M>>,
    combiner: Option<Arc<dyn MessageCombiner<M>>>,
}

impl<M> IncomingCache<M> {
    /// Create an empty cache; a combiner selects combining mode
    pub fn new(
        format: Arc<dyn MessageFormat<M>>,
        combiner: Option<Arc<dyn MessageCombiner<M>>>,
    ) -> Self {
        Self {
            store: Mutex::new(MessageStore::default()),
            format,
            combiner,
        }
    }

    /// Check if messages are folded by a combiner
    pub fn is_combining(&self) -> bool {
        self.combiner.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, MessageStore<M>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_mut(&mut self) -> &mut MessageStore<M> {
        self.store.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a serialized batch `{"shard": n, "messages": [key, payload, ...]}`
    ///
    /// A payload that is a JSON array is read as a list of messages. Pairs
    /// before a bad key or payload stay inserted. Returns the number of
    /// messages inserted.
    pub fn parse_messages(&self, batch: &Value) -> Result<usize, PregelError> {
        let shard = batch
            .get("shard")
            .and_then(Value::as_u64)
            .and_then(|s| ShardId::try_from(s).ok())
            .ok_or_else(|| PregelError::malformed_batch("missing or invalid 'shard'"))?;
        let entries = batch
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| PregelError::malformed_batch("missing 'messages' array"))?;
        if entries.len() % 2 != 0 {
            return Err(PregelError::malformed_batch(format!(
                "odd number of entries ({})",
                entries.len()
            )));
        }

        let combiner = self.combiner.as_deref();
        let mut store = self.lock();
        let mut inserted = 0;
        for pair in entries.chunks_exact(2) {
            let key = pair[0].as_str().ok_or_else(|| {
                PregelError::malformed_batch(format!("vertex key must be a string, got {}", pair[0]))
            })?;
            match &pair[1] {
                Value::Array(payloads) => {
                    for payload in payloads {
                        let message = self.format.unwrap_value(payload)?;
                        store.insert(combiner, shard, key, message);
                        store.received += 1;
                        inserted += 1;
                    }
                }
                payload => {
                    let message = self.format.unwrap_value(payload)?;
                    store.insert(combiner, shard, key, message);
                    store.received += 1;
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    /// Deliver a message from a vertex on the same worker
    pub fn set_direct(&self, shard: ShardId, key: &str, message: M) {
        let combiner = self.combiner.as_deref();
        let mut store = self.lock();
        store.insert(combiner, shard, key, message);
        store.received += 1;
    }

    /// Messages delivered to one vertex
    pub fn get_messages(&mut self, shard: ShardId, key: &str) -> MessageIterator<'_, M> {
        match self.store_mut().bags.get(&shard).and_then(|keys| keys.get(key)) {
            Some(bag) => MessageIterator::new(bag),
            None => MessageIterator::empty(),
        }
    }

    /// Check if any message was delivered to one vertex
    pub fn has_messages(&mut self, shard: ShardId, key: &str) -> bool {
        self.get_messages(shard, key).next().is_some()
    }

    /// Drain `other` into this cache, appending or combining per vertex
    pub fn merge_cache(&self, other: &mut IncomingCache<M>) {
        let drained = std::mem::take(other.store_mut());
        let combiner = self.combiner.as_deref();
        let mut store = self.lock();
        for (shard, keys) in drained.bags {
            for (key, bag) in keys {
                for message in bag {
                    store.insert(combiner, shard, &key, message);
                }
            }
        }
        store.received += drained.received;
    }

    /// Remove every message and reset the received counter
    pub fn clear(&self) {
        let mut store = self.lock();
        store.bags.clear();
        store.received = 0;
    }

    /// Remove the messages of one vertex
    pub fn erase(&self, shard: ShardId, key: &str) {
        let mut store = self.lock();
        let removed = store
            .bags
            .get_mut(&shard)
            .and_then(|keys| keys.remove(key))
            .map(|bag| bag.len())
            .unwrap_or(0);
        store.received = store.received.saturating_sub(removed);
    }

    /// Visit every stored `(shard, key, message)`
    pub fn for_each(&self, mut f: impl FnMut(ShardId, &str, &M)) {
        let store = self.lock();
        for (shard, keys) in &store.bags {
            for (key, bag) in keys {
                for message in bag {
                    f(*shard, key, message);
                }
            }
        }
    }

    /// Number of arrivals since the last clear, including combined ones
    pub fn received_message_count(&self) -> usize {
        self.lock().received
    }

    /// Exchange contents with `read`; used to rotate caches at the barrier
    pub fn swap_into(&self, read: &mut IncomingCache<M>) {
        let mut store = self.lock();
        std::mem::swap(&mut *store, read.store_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::{MinCombiner, SumCombiner};
    use crate::format::JsonMessageFormat;
    use serde_json::json;

    fn array_cache() -> IncomingCache<u64> {
        IncomingCache::new(Arc::new(JsonMessageFormat::<u64>::new()), None)
    }

    fn min_cache() -> IncomingCache<u64> {
        IncomingCache::new(Arc::new(JsonMessageFormat::<u64>::new()), Some(Arc::new(MinCombiner)))
    }

    fn sum_cache() -> IncomingCache<i64> {
        IncomingCache::new(Arc::new(JsonMessageFormat::<i64>::new()), Some(Arc::new(SumCombiner)))
    }

    fn collect<M: Clone>(cache: &mut IncomingCache<M>, shard: ShardId, key: &str) -> Vec<M> {
        cache.get_messages(shard, key).cloned().collect()
    }

    #[test]
    fn test_array_mode_preserves_order() {
        let mut cache = array_cache();
        cache.set_direct(0, "a", 5);
        cache.set_direct(0, "a", 1);
        cache.set_direct(0, "b", 9);
        cache.set_direct(0, "a", 3);

        assert_eq!(collect(&mut cache, 0, "a"), vec![5, 1, 3]);
        assert_eq!(collect(&mut cache, 0, "b"), vec![9]);
        assert_eq!(cache.received_message_count(), 4);
    }

    #[test]
    fn test_unknown_vertex_is_empty() {
        let mut cache = array_cache();
        cache.set_direct(0, "a", 1);
        assert!(collect(&mut cache, 0, "zzz").is_empty());
        assert!(collect(&mut cache, 7, "a").is_empty());
        assert!(!cache.has_messages(7, "a"));
    }

    #[test]
    fn test_min_combiner_any_order() {
        let orderings = [[7u64, 3, 9], [9, 7, 3], [3, 9, 7]];
        for ordering in orderings {
            let mut cache = min_cache();
            for message in ordering {
                cache.set_direct(1, "v", message);
            }
            assert_eq!(collect(&mut cache, 1, "v"), vec![3]);
            assert_eq!(cache.received_message_count(), 3);
        }
    }

    #[test]
    fn test_parse_messages() {
        let mut cache = array_cache();
        let batch = json!({"shard": 2, "messages": ["a", 1, "b", [2, 3], "a", 4]});
        assert_eq!(cache.parse_messages(&batch).unwrap(), 4);
        assert_eq!(collect(&mut cache, 2, "a"), vec![1, 4]);
        assert_eq!(collect(&mut cache, 2, "b"), vec![2, 3]);
    }

    #[test]
    fn test_parse_messages_odd_entries_inserts_nothing() {
        let cache = array_cache();
        let batch = json!({"shard": 0, "messages": ["a", 1, "b"]});
        let err = cache.parse_messages(&batch).unwrap_err();
        assert!(matches!(err, PregelError::MalformedBatch(_)));
        assert_eq!(cache.received_message_count(), 0);
    }

    #[test]
    fn test_parse_messages_bad_payload_keeps_prefix() {
        let mut cache = array_cache();
        let batch = json!({"shard": 0, "messages": ["a", 1, "b", "not a number", "c", 3]});
        let err = cache.parse_messages(&batch).unwrap_err();
        assert!(matches!(err, PregelError::MessageDecode(_)));
        assert_eq!(collect(&mut cache, 0, "a"), vec![1]);
        assert!(collect(&mut cache, 0, "c").is_empty());
    }

    #[test]
    fn test_parse_messages_non_string_key() {
        let cache = array_cache();
        let batch = json!({"shard": 0, "messages": [17, 1]});
        assert!(matches!(
            cache.parse_messages(&batch),
            Err(PregelError::MalformedBatch(_))
        ));
    }

    #[test]
    fn test_parse_messages_missing_shard() {
        let cache = array_cache();
        assert!(cache.parse_messages(&json!({"messages": []})).is_err());
        assert!(cache.parse_messages(&json!({"shard": 0})).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cache = min_cache();
        cache.set_direct(0, "a", 1);
        cache.set_direct(0, "b", 2);

        cache.clear();
        assert_eq!(cache.received_message_count(), 0);
        assert!(collect(&mut cache, 0, "a").is_empty());

        cache.clear();
        assert_eq!(cache.received_message_count(), 0);
        assert!(collect(&mut cache, 0, "b").is_empty());
    }

    #[test]
    fn test_erase() {
        let mut cache = array_cache();
        cache.set_direct(0, "a", 1);
        cache.set_direct(0, "a", 2);
        cache.set_direct(0, "b", 3);

        cache.erase(0, "a");
        assert!(collect(&mut cache, 0, "a").is_empty());
        assert_eq!(collect(&mut cache, 0, "b"), vec![3]);
        assert_eq!(cache.received_message_count(), 1);

        cache.erase(0, "missing");
        assert_eq!(cache.received_message_count(), 1);
    }

    #[test]
    fn test_for_each() {
        let cache = array_cache();
        cache.set_direct(0, "a", 1);
        cache.set_direct(1, "b", 2);
        cache.set_direct(1, "b", 3);

        let mut seen = Vec::new();
        cache.for_each(|shard, key, message| seen.push((shard, key.to_string(), *message)));
        seen.sort();
        assert_eq!(
            seen,
            vec![(0, "a".to_string(), 1), (1, "b".to_string(), 2), (1, "b".to_string(), 3)]
        );
    }

    #[test]
    fn test_merge_drains_other() {
        let mut target = array_cache();
        let mut other = array_cache();
        target.set_direct(0, "a", 1);
        other.set_direct(0, "a", 2);
        other.set_direct(0, "b", 3);

        target.merge_cache(&mut other);
        assert_eq!(collect(&mut target, 0, "a"), vec![1, 2]);
        assert_eq!(collect(&mut target, 0, "b"), vec![3]);
        assert_eq!(target.received_message_count(), 3);
        assert_eq!(other.received_message_count(), 0);
        assert!(collect(&mut other, 0, "a").is_empty());
    }

    fn filled(values: &[(&str, i64)], combining: bool) -> IncomingCache<i64> {
        let cache = if combining {
            sum_cache()
        } else {
            IncomingCache::new(Arc::new(JsonMessageFormat::<i64>::new()), None)
        };
        for (key, value) in values {
            cache.set_direct(0, key, *value);
        }
        cache
    }

    fn sum_of(cache: &mut IncomingCache<i64>, key: &str) -> i64 {
        cache.get_messages(0, key).sum()
    }

    #[test]
    fn test_merge_is_associative() {
        let a = [("x", 1), ("y", 10)];
        let b = [("x", 2), ("z", 20)];
        let c = [("x", 4), ("y", 30)];

        for combining in [true, false] {
            // (a + b) + c
            let mut left = filled(&a, combining);
            left.merge_cache(&mut filled(&b, combining));
            left.merge_cache(&mut filled(&c, combining));

            // a + (b + c)
            let mut bc = filled(&b, combining);
            bc.merge_cache(&mut filled(&c, combining));
            let mut right = filled(&a, combining);
            right.merge_cache(&mut bc);

            for key in ["x", "y", "z"] {
                assert_eq!(sum_of(&mut left, key), sum_of(&mut right, key));
            }
            assert_eq!(sum_of(&mut left, "x"), 7);
            assert_eq!(left.received_message_count(), right.received_message_count());
        }
    }

    #[test]
    fn test_swap_into_rotates() {
        let write = array_cache();
        let mut read = array_cache();
        read.set_direct(0, "old", 1);
        write.set_direct(0, "new", 2);

        read.clear();
        write.swap_into(&mut read);

        assert_eq!(collect(&mut read, 0, "new"), vec![2]);
        assert!(collect(&mut read, 0, "old").is_empty());
        assert_eq!(write.received_message_count(), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let cache = Arc::new(sum_cache());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        cache.set_direct(0, "hot", i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut cache = Arc::try_unwrap(cache).ok().unwrap();
        assert_eq!(cache.received_message_count(), 400);
        assert_eq!(sum_of(&mut cache, "hot"), 600);
    }
}
