use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::index::{Checkpoint, Index};
use crate::log::DataLog;

/// Rebuilds the index for a storage directory: load the checkpoint if one
/// exists, then replay the log tail it does not cover.
///
/// Returns the index together with the offset the next checkpoint should
/// consider itself authoritative up to. Running recovery twice over the same
/// files yields the same index: replay re-reads the record at the resume
/// offset, and [`Index::insert`] ignores offsets already present.
pub fn recover_index(config: &StoreConfig, log: Arc<DataLog>) -> Result<(Index, u64)> {
    let mut index = Index::new(Arc::clone(&log));
    let mut checkpointed = 0;

    match Checkpoint::load(&config.index_path()) {
        Ok(Some(checkpoint)) => {
            tracing::info!(
                last_offset = checkpoint.last_offset,
                buckets = checkpoint.key_offsets.len(),
                "loaded index checkpoint"
            );
            checkpointed = checkpoint.last_offset;
            checkpoint.populate(&mut index);
        }
        Ok(None) => {
            tracing::info!("no index checkpoint, rebuilding from log");
        }
        Err(e) => {
            // A half-written or garbled checkpoint is survivable: the log is
            // authoritative, so rebuild from offset zero.
            tracing::warn!(error = %e, "checkpoint unreadable, rebuilding from log");
        }
    }

    let resume = checkpointed.max(index.last_offset());
    replay(&mut index, &log, resume)?;

    let final_offset = checkpointed.max(index.last_offset());
    Ok((index, final_offset))
}

/// Replays log records from `from` into the index: live records insert
/// (superseding stale offsets for the same full key), tombstones remove by
/// full-key match. A corrupt record stops replay at its offset; everything
/// recovered before it is kept.
fn replay(index: &mut Index, log: &DataLog, from: u64) -> Result<()> {
    let Some(entries) = log.replay(from)? else {
        return Ok(());
    };

    let mut replayed = 0usize;
    for entry in entries {
        match entry {
            Ok((offset, record)) => {
                if record.tomb {
                    index.del(&record.key)?;
                } else {
                    index.insert(&record.key, offset, record.size)?;
                }
                replayed += 1;
            }
            Err(Error::Corrupt(msg)) => {
                tracing::warn!(detail = %msg, "stopping log replay at corrupt record");
                break;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(records = replayed, from = from, "log replay complete");
    Ok(())
}
