use std::fs;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::Cache;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::index::{recovery, Index};
use crate::log::DataLog;
use crate::store::flush::{Command, IndexFlusher, LogFlusher};
use crate::store::Store;

/// The storage engine: a value cache and a partial-key index in front of an
/// append-only data log, with writes buffered through two background
/// flushers.
///
/// `put` and `del` are acknowledged once the command is buffered; the log
/// record is written by the log flusher, so a crash before its batch is
/// flushed loses the buffered commands. `shutdown` drains both flushers and
/// returns only after the final index checkpoint is on disk.
pub struct KvStore {
    cache: Cache<String, String>,
    index: Arc<RwLock<Index>>,
    log: Arc<DataLog>,
    commands: mpsc::Sender<Command>,
    log_flusher: JoinHandle<()>,
    index_flusher: JoinHandle<()>,
}

impl KvStore {
    /// Opens a store in the default `./storage` directory.
    ///
    /// Must be called from within a tokio runtime; the flushers are spawned
    /// onto it.
    pub fn open() -> Result<Self> {
        Self::open_with_config(StoreConfig::default())
    }

    /// Opens a store with the given configuration, creating the storage
    /// directory if needed and recovering the index from the checkpoint and
    /// the log tail.
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        tracing::info!(dir = %config.dir.display(), "opening store");

        let log = Arc::new(DataLog::new(config.log_path()));
        let (index, last_offset) = recovery::recover_index(&config, Arc::clone(&log))?;

        // The index flusher's shadow starts as a copy of the recovered
        // index, so its first checkpoint covers everything already on disk.
        let shadow = index.clone();
        let index = Arc::new(RwLock::new(index));

        let (command_tx, command_rx) = mpsc::channel(config.log_flush_threshold);
        let (pair_tx, pair_rx) = mpsc::channel(config.index_flush_threshold);

        let log_flusher = LogFlusher::new(
            Arc::clone(&log),
            command_rx,
            pair_tx,
            config.log_flush_threshold,
        )
        .spawn();
        let index_flusher =
            IndexFlusher::new(Arc::clone(&index), shadow, pair_rx, &config, last_offset).spawn();

        Ok(Self {
            cache: Cache::new(config.cache_capacity),
            index,
            log,
            commands: command_tx,
            log_flusher,
            index_flusher,
        })
    }

    /// Stores a value. The write is buffered: it lands in the cache
    /// immediately and in the log once the log flusher's batch fills or the
    /// store shuts down. Blocks only when the command queue is full.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        check_value(value)?;

        self.cache.add(key.to_string(), value.to_string());
        self.commands
            .send(Command::Put {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Returns the latest value for the key: from the cache when resident,
    /// otherwise by resolving the partial key's candidate offsets against
    /// the log, oldest first, until the full key matches.
    pub fn get(&self, key: &str) -> Result<String> {
        check_key(key)?;

        if let Some(value) = self.cache.get(&key.to_string()) {
            return Ok(value);
        }
        tracing::debug!(key = %key, "value not cached, reading disk");

        // Hold the read lock only to copy the candidate offsets; the log
        // reads below run without it.
        let offsets: Vec<u64> = {
            let index = self.index.read().unwrap();
            match index.get(key) {
                Some(items) => items.iter().map(|item| item.offset()).collect(),
                None => return Err(Error::NotFound),
            }
        };

        for offset in offsets {
            let record = self.log.read(offset)?.ok_or_else(|| {
                Error::Corrupt(format!("index offset {offset} is beyond the end of the log"))
            })?;
            if record.key == key && !record.tomb {
                self.cache.add(key.to_string(), record.value.clone());
                return Ok(record.value);
            }
        }
        Err(Error::NotFound)
    }

    /// Deletes the key: drops it from the cache and the live index, then
    /// buffers a tombstone for the log. Deleting an absent key succeeds.
    pub async fn del(&self, key: &str) -> Result<()> {
        check_key(key)?;
        tracing::debug!(key = %key, "delete");

        self.cache.remove(&key.to_string());
        {
            let mut index = self.index.write().unwrap();
            index.del(key)?;
        }

        self.commands
            .send(Command::Del {
                key: key.to_string(),
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Shuts the store down: closes the command queue and waits until both
    /// flushers have drained, so every buffered put and del is in the log
    /// and covered by the final checkpoint.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("shutting down store, saving any remaining data");
        drop(self.commands);
        self.log_flusher.await?;
        self.index_flusher.await?;
        tracing::info!("all data saved");
        Ok(())
    }

    /// (hits, misses) of the value cache, for diagnostics.
    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }
}

#[async_trait::async_trait]
impl Store for KvStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        KvStore::put(self, key, value).await
    }

    fn get(&self, key: &str) -> Result<String> {
        KvStore::get(self, key)
    }

    async fn del(&self, key: &str) -> Result<()> {
        KvStore::del(self, key).await
    }
}

/// The log format cannot carry field or record separators, so keys must be
/// non-empty and neither keys nor values may contain commas or newlines.
fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("key must not be empty".into()));
    }
    if key.contains(',') || key.contains('\n') {
        return Err(Error::InvalidInput(format!(
            "key {key:?} contains a comma or newline"
        )));
    }
    Ok(())
}

fn check_value(value: &str) -> Result<()> {
    if value.contains(',') || value.contains('\n') {
        return Err(Error::InvalidInput(
            "value contains a comma or newline".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(dir: &TempDir) -> KvStore {
        KvStore::open_with_config(StoreConfig::new(dir.path())).expect("Failed to open store")
    }

    #[tokio::test]
    async fn test_put_and_get() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        store.put("alpha", "1").await?;
        store.put("beta", "2").await?;

        assert_eq!(store.get("alpha")?, "1");
        assert_eq!(store.get("beta")?, "2");

        store.shutdown().await
    }

    #[tokio::test]
    async fn test_last_write_wins() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        store.put("k", "v1").await?;
        store.put("k", "v2").await?;

        assert_eq!(store.get("k")?, "v2");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        store.put("k", "v").await?;
        store.del("k").await?;

        assert_eq!(store.get("k"), Err(Error::NotFound));

        // A later put resurrects the key.
        store.put("k", "v2").await?;
        assert_eq!(store.get("k")?, "v2");

        store.shutdown().await
    }

    #[tokio::test]
    async fn test_get_missing_key() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        assert_eq!(store.get("never"), Err(Error::NotFound));
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_del_absent_key_succeeds() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        store.del("never").await?;
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_partial_key_collisions_stay_independent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        store.put("abcdefghijklmnopXXX", "x").await?;
        store.put("abcdefghijklmnopYYY", "y").await?;

        assert_eq!(store.get("abcdefghijklmnopXXX")?, "x");
        assert_eq!(store.get("abcdefghijklmnopYYY")?, "y");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_read_your_writes() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        for i in 0..50 {
            let key = format!("key_{i:03}");
            let value = format!("value_{i}");
            store.put(&key, &value).await?;
            assert_eq!(store.get(&key)?, value);
        }
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_restart_recovers_values() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        store.put("a", "1").await?;
        store.put("b", "2").await?;
        store.shutdown().await?;

        let store = create_test_store(&dir);
        assert_eq!(store.get("a")?, "1");
        assert_eq!(store.get("b")?, "2");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_tombstone_survives_restart() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        store.put("k", "v").await?;
        store.del("k").await?;
        store.shutdown().await?;

        let store = create_test_store(&dir);
        assert_eq!(store.get("k"), Err(Error::NotFound));
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_last_writer_wins_across_restart() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        store.put("k", "v1").await?;
        store.put("other", "x").await?;
        store.put("k", "v2").await?;
        store.shutdown().await?;

        // The reopened store has a cold cache, so this exercises the index
        // and log-scan path.
        let store = create_test_store(&dir);
        assert_eq!(store.get("k")?, "v2");
        assert_eq!(store.get("other")?, "x");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_collisions_survive_restart() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        store.put("abcdefghijklmnopXXX", "x").await?;
        store.put("abcdefghijklmnopYYY", "y").await?;
        store.shutdown().await?;

        let store = create_test_store(&dir);
        assert_eq!(store.get("abcdefghijklmnopXXX")?, "x");
        assert_eq!(store.get("abcdefghijklmnopYYY")?, "y");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_disk_read_after_cache_eviction() -> Result<()> {
        let dir = TempDir::new()?;
        let config = StoreConfig::new(dir.path())
            .log_flush_threshold(1)
            .index_flush_threshold(1)
            .cache_capacity(1);
        let store = KvStore::open_with_config(config)?;

        store.put("first", "1").await?;
        store.put("second", "2").await?; // evicts "first" from the cache

        // With both thresholds at one, the flushers index "first" promptly;
        // wait for the disk path to serve it.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            match store.get("first") {
                Ok(value) => {
                    assert_eq!(value, "1");
                    break;
                }
                Err(Error::NotFound) => {
                    assert!(
                        std::time::Instant::now() < deadline,
                        "index never caught up"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
                Err(e) => return Err(e),
            }
        }

        let (hits, misses) = store.cache_stats();
        assert!(misses >= 1, "expected at least one miss, got {hits}/{misses}");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_rejects_unstorable_keys_and_values() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        assert!(matches!(
            store.put("", "v").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.put("a,b", "v").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.put("a\nb", "v").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.put("k", "v,1").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.put("k", "v\n1").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(store.get(""), Err(Error::InvalidInput(_))));

        store.shutdown().await
    }

    #[tokio::test]
    async fn test_empty_store_reopen() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        store.shutdown().await?;

        let store = create_test_store(&dir);
        assert_eq!(store.get("anything"), Err(Error::NotFound));
        store.put("k", "v").await?;
        assert_eq!(store.get("k")?, "v");
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_many_writes_roundtrip_restart() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        for i in 0..250 {
            store
                .put(&format!("key_{i:04}"), &format!("value_{i}"))
                .await?;
        }
        for i in (0..250).step_by(3) {
            store.del(&format!("key_{i:04}")).await?;
        }
        store.shutdown().await?;

        let store = create_test_store(&dir);
        for i in 0..250 {
            let key = format!("key_{i:04}");
            if i % 3 == 0 {
                assert_eq!(store.get(&key), Err(Error::NotFound), "{key} was deleted");
            } else {
                assert_eq!(store.get(&key)?, format!("value_{i}"), "{key} must survive");
            }
        }
        store.shutdown().await
    }

    #[tokio::test]
    async fn test_open_survives_interrupted_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;

        let store = create_test_store(&dir);
        store.put("settled", "v").await?;
        store.shutdown().await?;

        // A crash between swap-file write and rename leaves a swap file
        // behind; the live checkpoint is still the previous, complete one.
        let config = StoreConfig::new(dir.path());
        std::fs::write(config.swap_path(), b"{ \"lastOffset\": 9")?;

        let store = KvStore::open_with_config(config.clone())?;
        assert_eq!(store.get("settled")?, "v");
        store.put("after", "w").await?;
        store.shutdown().await?;

        // The next checkpoint replaced the stale swap file.
        assert!(!config.swap_path().exists());
        assert!(config.index_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_trait_object_surface() -> Result<()> {
        let dir = TempDir::new()?;
        let store = create_test_store(&dir);

        async fn exercise(store: &dyn Store) -> Result<String> {
            store.put("via-trait", "works").await?;
            store.get("via-trait")
        }

        assert_eq!(exercise(&store).await?, "works");
        store.shutdown().await
    }
}
