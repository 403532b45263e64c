use std::path::PathBuf;

/// File name of the append-only data log inside the storage directory.
pub const STORAGE_FILE: &str = "data_records.csv";

/// File name of the live index checkpoint.
pub const INDEX_FILE: &str = "index_file.json";

/// File name of the in-flight checkpoint, renamed over [`INDEX_FILE`] once
/// fully written.
pub const INDEX_SWAP_FILE: &str = "index_swap_file.json";

/// Configuration for a [`KvStore`](crate::store::KvStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the data log and index checkpoint (default: ./storage)
    pub dir: PathBuf,

    /// How many commands the log flusher batches before writing (default: 10).
    /// Also the capacity of the command queue, so backpressure reaches
    /// callers once a full batch is waiting.
    pub log_flush_threshold: usize,

    /// How many key/offset pairs the index flusher batches before writing a
    /// checkpoint (default: 100). Also the capacity of the pair queue.
    pub index_flush_threshold: usize,

    /// Maximum number of entries in the value cache (default: 1000).
    pub cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./storage"),
            log_flush_threshold: 10,
            index_flush_threshold: 100,
            cache_capacity: 1000,
        }
    }
}

impl StoreConfig {
    /// Create a new config with the given storage directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the log flush batch size / command queue capacity
    pub fn log_flush_threshold(mut self, threshold: usize) -> Self {
        self.log_flush_threshold = threshold;
        self
    }

    /// Set the index flush batch size / pair queue capacity
    pub fn index_flush_threshold(mut self, threshold: usize) -> Self {
        self.index_flush_threshold = threshold;
        self
    }

    /// Set the value cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Path of the data log file.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(STORAGE_FILE)
    }

    /// Path of the live index checkpoint file.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Path of the transient checkpoint swap file.
    pub fn swap_path(&self) -> PathBuf {
        self.dir.join(INDEX_SWAP_FILE)
    }
}
