use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    sync::atomic::{AtomicUsize, Ordering},
    sync::Mutex,
};

/// A bounded cache with strict least-recently-used eviction.
///
/// The cache is advisory: a miss must fall through to the index and data
/// log, and a hit is only authoritative because writes update or invalidate
/// entries in place. All methods take `&self`; the cache synchronizes
/// internally so it can be shared between caller threads and the flushers.
pub struct Cache<K, V>
where
    K: PartialEq + Eq + Hash + Clone,
    V: Clone,
{
    inner: Mutex<Inner<K, V>>,
    stats: Stats,
}

struct Inner<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    /// Recency queue: least-recently-used key at the front.
    order: VecDeque<K>,
}

impl<K, V> Cache<K, V>
where
    K: PartialEq + Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Cache {
            inner: Mutex::new(Inner {
                capacity,
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            stats: Stats::new(),
        }
    }

    /// Returns a clone of the value for the given key, refreshing its
    /// recency, if it is resident.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(value) = inner.entries.get(key).cloned() {
            inner.touch(key);
            self.stats.hit();
            Some(value)
        } else {
            self.stats.miss();
            None
        }
    }

    /// Inserts or updates an entry, evicting the least-recently-used entry
    /// when the cache is over capacity.
    pub fn add(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.insert(key.clone(), value).is_some() {
            inner.touch(&key);
            return;
        }

        inner.order.push_back(key);
        if inner.entries.len() > inner.capacity {
            if let Some(lru) = inner.order.pop_front() {
                inner.entries.remove(&lru);
            }
        }
    }

    /// Drops an entry if present.
    pub fn remove(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(key).is_some() {
            if let Some(pos) = inner.order.iter().position(|k| k == key) {
                inner.order.remove(pos);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) counters since creation.
    pub fn stats(&self) -> (usize, usize) {
        self.stats.get()
    }
}

impl<K, V> Inner<K, V>
where
    K: PartialEq + Eq + Hash + Clone,
{
    /// Moves an existing key to the most-recently-used position.
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }
}

struct Stats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Stats {
    fn new() -> Self {
        Stats {
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::SeqCst),
            self.misses.load(Ordering::SeqCst),
        )
    }
}
