//! Chunked, conflict-ignoring persistence of one source's records.

use std::collections::HashSet;
use std::sync::Arc;

use pourbase_core::CanonicalRecord;
use pourbase_storage::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::clamp_chunk_size;

/// Drop records whose natural key already appeared earlier in `records`.
/// Returns the survivors in original order and the number dropped.
pub fn dedupe_by_natural_key(records: Vec<CanonicalRecord>) -> (Vec<CanonicalRecord>, usize) {
    let mut seen = HashSet::with_capacity(records.len());
    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .filter(|record| seen.insert(record.natural_key()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistOutcome {
    pub inserted: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct BatchPersister {
    store: Arc<dyn RecordStore>,
    chunk_size: usize,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn RecordStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: clamp_chunk_size(chunk_size),
        }
    }

    /// Insert `records` chunk by chunk. A failed chunk is logged and counted,
    /// and the remaining chunks still run.
    pub async fn persist(&self, source: &str, records: Vec<CanonicalRecord>) -> PersistOutcome {
        let (records, duplicates) = dedupe_by_natural_key(records);
        if duplicates > 0 {
            debug!(source, duplicates, "collapsed repeated natural keys");
        }

        let mut outcome = PersistOutcome {
            duplicates,
            ..Default::default()
        };
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            outcome.chunks += 1;
            match self.store.insert_new(chunk).await {
                Ok(inserted) => {
                    debug!(source, chunk = index, submitted = chunk.len(), inserted, "chunk persisted");
                    outcome.inserted += inserted;
                }
                Err(err) => {
                    warn!(source, chunk = index, submitted = chunk.len(), error = %err, "chunk failed; continuing");
                    outcome.failed_chunks += 1;
                    outcome
                        .errors
                        .push(format!("chunk {index} ({} records): {err}", chunk.len()));
                }
            }
        }
        outcome
    }
}
