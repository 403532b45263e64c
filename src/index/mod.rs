pub mod checkpoint;
pub mod recovery;

pub use checkpoint::Checkpoint;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::log::DataLog;

/// Length of the prefix used as the index's hashing key. Keys longer than 16
/// characters are indexed under their first 15 characters; shorter keys are
/// indexed whole. Bounds index memory for long keys; collisions are expected
/// and resolved by full-key comparison against the log.
const PARTIAL_KEY_LEN: usize = 15;

/// The partial key a full key is indexed under.
pub fn partial_key(key: &str) -> &str {
    if key.chars().count() <= PARTIAL_KEY_LEN + 1 {
        return key;
    }
    match key.char_indices().nth(PARTIAL_KEY_LEN) {
        Some((end, _)) => &key[..end],
        None => key,
    }
}

/// An in-memory pointer into the data log.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexItem {
    partial_key: String,
    offset: u64,
    size: u64,
}

impl IndexItem {
    pub fn new(key: &str, offset: u64, size: u64) -> Self {
        IndexItem {
            partial_key: partial_key(key).to_string(),
            offset,
            size,
        }
    }

    pub fn partial_key(&self) -> &str {
        &self.partial_key
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Mapping from partial keys to the ordered offsets of their records.
///
/// Buckets hold items oldest-first. Because a partial key can collide, a
/// lookup yields candidate offsets that the caller resolves by comparing the
/// full key stored in the log. The index holds a read-only [`DataLog`]
/// capability for the full-key comparisons that removal needs.
#[derive(Debug, Clone)]
pub struct Index {
    items: HashMap<String, Vec<IndexItem>>,
    log: Arc<DataLog>,
}

impl Index {
    pub fn new(log: Arc<DataLog>) -> Self {
        Index {
            items: HashMap::new(),
            log,
        }
    }

    /// Returns the bucket for the key's partial key, if it has any entries.
    pub fn get(&self, key: &str) -> Option<&[IndexItem]> {
        self.items.get(partial_key(key)).map(Vec::as_slice)
    }

    /// Appends an item to its partial key's bucket without deduplication.
    /// Used when repopulating from a checkpoint, where buckets are already
    /// in their final shape.
    pub fn put(&mut self, item: IndexItem) {
        self.items
            .entry(item.partial_key.clone())
            .or_default()
            .push(item);
    }

    /// Records a live log record for `key` at `offset`, superseding any
    /// earlier offset indexed for the same full key. Re-inserting an offset
    /// already present in the bucket is a no-op, which keeps replay
    /// idempotent.
    pub fn insert(&mut self, key: &str, offset: u64, size: u64) -> Result<()> {
        let partial = partial_key(key);
        if let Some(bucket) = self.items.get(partial) {
            if bucket.iter().any(|item| item.offset == offset) {
                return Ok(());
            }
        }

        self.del(key)?;
        self.items
            .entry(partial.to_string())
            .or_default()
            .push(IndexItem::new(key, offset, size));
        Ok(())
    }

    /// Removes every item under the key's partial key whose log record's
    /// full key equals `key`, via swap-with-last; ordering inside a bucket
    /// is not required for correctness. Stops early if a log read fails.
    pub fn del(&mut self, key: &str) -> Result<()> {
        let partial = partial_key(key);
        let Some(bucket) = self.items.get_mut(partial) else {
            return Ok(());
        };

        let mut i = 0;
        while i < bucket.len() {
            match self.log.read(bucket[i].offset)? {
                Some(record) if record.key == key => {
                    bucket.swap_remove(i);
                }
                _ => i += 1,
            }
        }

        if bucket.is_empty() {
            self.items.remove(partial);
        }
        Ok(())
    }

    /// The largest offset held by any item, or zero when empty.
    pub fn last_offset(&self) -> u64 {
        self.items
            .values()
            .flatten()
            .map(|item| item.offset)
            .max()
            .unwrap_or(0)
    }

    /// Number of partial-key buckets.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn buckets(&self) -> &HashMap<String, Vec<IndexItem>> {
        &self.items
    }
}
