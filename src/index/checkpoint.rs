use std::fs::{self, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::{Index, IndexItem};

/// On-disk snapshot of the index.
///
/// `last_offset` is the byte position in the data log up to which this
/// document is authoritative; recovery replays the log from there forward.
/// The document is always replaced wholesale by writing a swap file and
/// renaming it over the live file, so observers see either the previous or
/// the new checkpoint, never a truncated one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "lastOffset")]
    pub last_offset: u64,
    #[serde(rename = "keyOffsets")]
    pub key_offsets: Vec<KeyOffsets>,
}

/// One partial-key bucket: the offsets of its records, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyOffsets {
    pub key: String,
    pub size: u64,
    pub offsets: Vec<u64>,
}

impl Checkpoint {
    /// Snapshots an index. Buckets are ordered by their first offset so the
    /// document is deterministic for identical index contents.
    pub fn from_index(index: &Index, last_offset: u64) -> Self {
        let key_offsets = index
            .buckets()
            .iter()
            .map(|(key, items)| KeyOffsets {
                key: key.clone(),
                size: items.last().map(IndexItem::size).unwrap_or(0),
                offsets: items.iter().map(IndexItem::offset).collect(),
            })
            .sorted_by_key(|bucket| bucket.offsets.first().copied().unwrap_or(0))
            .collect();

        Checkpoint {
            last_offset,
            key_offsets,
        }
    }

    /// Repopulates an index from this checkpoint. The stored keys are
    /// already partial keys, so items are appended verbatim.
    pub fn populate(&self, index: &mut Index) {
        for bucket in &self.key_offsets {
            for offset in &bucket.offsets {
                index.put(IndexItem {
                    partial_key: bucket.key.clone(),
                    offset: *offset,
                    size: bucket.size,
                });
            }
        }
    }

    /// Writes this checkpoint to `swap_path`, flushes it, and renames it
    /// over `live_path`. A stale swap file from an interrupted flush is
    /// removed first. The rename happens after the swap file is closed.
    pub fn save(&self, swap_path: &Path, live_path: &Path) -> Result<()> {
        if swap_path.exists() {
            tracing::info!(path = %swap_path.display(), "removing stale checkpoint swap file");
            fs::remove_file(swap_path)?;
        }

        let json = serde_json::to_vec_pretty(self)?;
        {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(0o644);
            let mut file = options.open(swap_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }

        fs::rename(swap_path, live_path)?;
        Ok(())
    }

    /// Reads the checkpoint at `path`. Returns `Ok(None)` when no checkpoint
    /// has been written yet; a present but malformed document is an error
    /// the caller decides how to survive.
    pub fn load(path: &Path) -> Result<Option<Checkpoint>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint = serde_json::from_slice(&bytes)?;
        Ok(Some(checkpoint))
    }
}
