//! Bounded recency cache with strict least-recently-used eviction
//!
//! Shields the pipeline from reprocessing a physical log line delivered twice
//! by buffering edge cases (a restart re-seeking near a line boundary, a
//! watcher replaying an event). Keys combine the content hash with the line
//! type; eviction follows access order, not insertion order.

use ahash::{HashMap, HashMapExt};
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Mutex;

struct Inner<K, V> {
    entries: HashMap<K, V>,
    /// Access order: front is least recently used, back most recently used
    order: VecDeque<K>,
}

pub struct RecencyCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> RecencyCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Capacity of zero is treated as one; a cache that can hold nothing
    /// would make every lookup a miss and defeat its purpose.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        let value = inner.entries.get(key).cloned()?;
        promote(&mut inner.order, key);
        Some(value)
    }

    /// Insert or update `key`. An existing key is updated and promoted; a new
    /// key evicts the least recently used entry when at capacity.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.contains_key(&key) {
            inner.entries.insert(key.clone(), value);
            promote(&mut inner.order, &key);
            return;
        }
        if inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn promote<K: Eq + Clone>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
        order.push_back(key.clone());
    }
}
