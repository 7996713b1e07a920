//! Durable term store on the local file system.
//!
//! A store directory contains a snapshot of the tables and a write-ahead log
//! of the transactions committed after it. Opening the directory loads the
//! snapshot and replays the log.

use std::path::Path;

use crate::config::StoreConfig;
use crate::error::{HindsightError, Result};
use crate::store::memory::TableStore;
use crate::store::tables::Tables;
use crate::store::wal::FileLog;

/// A term store persisted to a directory.
pub type FileTermStore = TableStore<FileLog>;

impl TableStore<FileLog> {
    /// Open (or create) the store in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        let (log, snapshot, records) =
            FileLog::open(dir, config.sync_writes, config.checkpoint_after)?;

        let mut tables = Tables::from_snapshot(snapshot)?;
        for record in &records {
            tables.apply_all(&record.ops).map_err(|err| {
                HindsightError::corruption(format!(
                    "cannot replay commit log record {}: {err}",
                    record.seq
                ))
            })?;
        }
        let stats = tables.stats();
        log::info!(
            "opened term store {} with {} terms, {} pairs ({} log records replayed)",
            dir.display(),
            stats.terms,
            stats.cooccurrences,
            records.len()
        );

        Ok(TableStore::with_log(tables, log))
    }

    /// Open the store configured in `config.path`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let path = config
            .path
            .as_ref()
            .ok_or_else(|| HindsightError::invalid_config("store.path is not set"))?;
        Self::open(path, config)
    }

    pub fn dir(&self) -> &Path {
        self.log().dir()
    }
}
