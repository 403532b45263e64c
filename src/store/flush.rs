use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::index::{Checkpoint, Index};
use crate::log::{DataLog, LogRecord};

/// A buffered write command on its way to the log flusher.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put { key: String, value: String },
    Del { key: String },
}

/// A written log record on its way to the index flusher.
#[derive(Debug, Clone, PartialEq)]
pub struct KvPair {
    pub key: String,
    pub tomb: bool,
    pub size: u64,
    pub offset: u64,
}

/// Consumes commands from the engine, appends one log record per command,
/// and emits the resulting key/offset pairs downstream.
///
/// Commands accumulate until the batch reaches the log flush threshold or
/// the command channel closes (shutdown), then the whole batch is appended
/// in order. The log is written here and only here. An append failure means
/// buffered writes can no longer be made durable, so it is fatal to the
/// process.
pub struct LogFlusher {
    log: Arc<DataLog>,
    commands: mpsc::Receiver<Command>,
    pairs: mpsc::Sender<KvPair>,
    threshold: usize,
}

impl LogFlusher {
    pub fn new(
        log: Arc<DataLog>,
        commands: mpsc::Receiver<Command>,
        pairs: mpsc::Sender<KvPair>,
        threshold: usize,
    ) -> Self {
        Self {
            log,
            commands,
            pairs,
            threshold,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut batch = Vec::with_capacity(self.threshold);
        loop {
            let closed = match self.commands.recv().await {
                Some(command) => {
                    batch.push(command);
                    false
                }
                None => true,
            };

            if batch.len() >= self.threshold || closed {
                self.flush(&mut batch).await;
            }

            if closed {
                // Dropping the pair sender closes the downstream channel,
                // which tells the index flusher to finish up.
                tracing::info!("command channel closed, log flusher draining");
                break;
            }
        }
    }

    async fn flush(&mut self, batch: &mut Vec<Command>) {
        if batch.is_empty() {
            return;
        }
        tracing::debug!(commands = batch.len(), "flushing command batch to log");

        for command in batch.drain(..) {
            let (record, tomb) = match &command {
                Command::Put { key, value } => (LogRecord::put(key, value), false),
                Command::Del { key } => (LogRecord::tombstone(key), true),
            };

            let offset = match self.log.append(&record) {
                Ok(offset) => offset,
                Err(e) => {
                    tracing::error!(
                        path = %self.log.path().display(),
                        error = %e,
                        "could not flush log, buffered writes would be lost"
                    );
                    std::process::abort();
                }
            };

            let pair = KvPair {
                key: record.key,
                tomb,
                size: record.size,
                offset,
            };
            if self.pairs.send(pair).await.is_err() {
                tracing::error!("index flusher is gone, checkpoint can no longer advance");
                std::process::abort();
            }
        }
    }
}

/// Consumes key/offset pairs, applies them to the live index, and
/// periodically checkpoints.
///
/// Pairs accumulate until the batch reaches the index flush threshold or the
/// channel closes. A flush applies the batch to the live index under its
/// write lock, then mirrors it into a private shadow index and writes the
/// checkpoint from the shadow after the lock is released, so readers are
/// never blocked on checkpoint IO. The task returns only after the final
/// batch has been checkpointed, which is what shutdown awaits.
pub struct IndexFlusher {
    index: Arc<RwLock<Index>>,
    shadow: Index,
    pairs: mpsc::Receiver<KvPair>,
    swap_path: PathBuf,
    live_path: PathBuf,
    threshold: usize,
    last_offset: u64,
}

impl IndexFlusher {
    pub fn new(
        index: Arc<RwLock<Index>>,
        shadow: Index,
        pairs: mpsc::Receiver<KvPair>,
        config: &StoreConfig,
        last_offset: u64,
    ) -> Self {
        Self {
            index,
            shadow,
            pairs,
            swap_path: config.swap_path(),
            live_path: config.index_path(),
            threshold: config.index_flush_threshold,
            last_offset,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut batch = Vec::with_capacity(self.threshold);
        loop {
            let closed = match self.pairs.recv().await {
                Some(pair) => {
                    batch.push(pair);
                    false
                }
                None => true,
            };

            if batch.len() >= self.threshold || closed {
                if let Err(e) = self.flush(&mut batch) {
                    tracing::error!(
                        path = %self.live_path.display(),
                        error = %e,
                        "could not checkpoint index"
                    );
                    std::process::abort();
                }
            }

            if closed {
                tracing::info!("pair channel closed, index flusher done");
                break;
            }
        }
    }

    fn flush(&mut self, batch: &mut Vec<KvPair>) -> Result<()> {
        tracing::debug!(pairs = batch.len(), "creating index checkpoint");

        {
            let mut live = self.index.write().unwrap();
            for pair in batch.iter() {
                Self::apply(&mut live, pair)?;
            }
        }

        for pair in batch.iter() {
            Self::apply(&mut self.shadow, pair)?;
        }

        // The checkpoint is authoritative up to the newest live record it
        // covers; a batch of nothing but tombstones keeps the previous mark.
        if let Some(max) = batch
            .iter()
            .filter(|pair| !pair.tomb)
            .map(|pair| pair.offset)
            .max()
        {
            self.last_offset = self.last_offset.max(max);
        }
        batch.clear();

        Checkpoint::from_index(&self.shadow, self.last_offset)
            .save(&self.swap_path, &self.live_path)
    }

    fn apply(index: &mut Index, pair: &KvPair) -> Result<()> {
        if pair.tomb {
            index.del(&pair.key)
        } else {
            index.insert(&pair.key, pair.offset, pair.size)
        }
    }
}
