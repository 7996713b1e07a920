//! Commit logs for the table store.
//!
//! Every committed transaction is handed to a [`CommitLog`] before the commit
//! returns. [`NullLog`] drops it (in-memory store); [`FileLog`] appends it to
//! a write-ahead log file as one framed record:
//!
//! ```text
//! +-------------+-------------+------------------------------+
//! | len (u32le) | crc (u32le) | payload (bincode LogRecord)  |
//! +-------------+-------------+------------------------------+
//! ```
//!
//! A record whose frame runs past the end of the file was torn by a crash
//! and is cut off when the log is reopened. A checksum mismatch in any other
//! record means the log is corrupt.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{HindsightError, Result};
use crate::store::tables::{Op, Snapshot};

/// Name of the log file inside a store directory.
pub const LOG_FILE: &str = "commit.log";
/// Name of the snapshot file inside a store directory.
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

const FRAME_HEADER_LEN: usize = 8;

/// Sink for committed transactions.
pub trait CommitLog: Send + Sync + fmt::Debug {
    /// Durably record one committed transaction.
    fn append(&self, ops: &[Op]) -> Result<()>;

    /// Whether enough records have accumulated to fold them into a snapshot.
    fn wants_checkpoint(&self) -> bool {
        false
    }

    /// Replace everything logged so far by `snapshot`.
    fn checkpoint(&self, _snapshot: Snapshot) -> Result<()> {
        Ok(())
    }

    /// Sequence number of the last appended record.
    fn last_seq(&self) -> u64 {
        0
    }
}

/// A log that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl CommitLog for NullLog {
    fn append(&self, _ops: &[Op]) -> Result<()> {
        Ok(())
    }
}

/// One committed transaction as stored in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub seq: u64,
    pub committed_at: DateTime<Utc>,
    pub ops: Vec<Op>,
}

/// Write-ahead log file plus snapshot file in one directory.
pub struct FileLog {
    dir: PathBuf,
    file: Mutex<File>,
    seq: AtomicU64,
    records_since_checkpoint: AtomicUsize,
    sync_writes: bool,
    checkpoint_after: usize,
}

impl fmt::Debug for FileLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLog")
            .field("dir", &self.dir)
            .field("seq", &self.seq.load(Ordering::SeqCst))
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl FileLog {
    /// Open the log in `dir`, returning the snapshot and the records written
    /// after it.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        sync_writes: bool,
        checkpoint_after: usize,
    ) -> Result<(Self, Snapshot, Vec<LogRecord>)> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let snapshot = read_snapshot(&dir.join(SNAPSHOT_FILE))?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOG_FILE))?;

        let (records, valid_len) = read_records(&mut file)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            log::warn!(
                "discarding {} bytes of torn commit log tail in {}",
                file_len - valid_len,
                dir.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        let records: Vec<LogRecord> = records
            .into_iter()
            .filter(|record| record.seq > snapshot.last_seq)
            .collect();
        let last_seq = records
            .last()
            .map(|record| record.seq)
            .unwrap_or(snapshot.last_seq);

        let log = FileLog {
            dir,
            file: Mutex::new(file),
            seq: AtomicU64::new(last_seq),
            records_since_checkpoint: AtomicUsize::new(records.len()),
            sync_writes,
            checkpoint_after,
        };
        Ok((log, snapshot, records))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CommitLog for FileLog {
    fn append(&self, ops: &[Op]) -> Result<()> {
        let mut file = self.file.lock();
        let seq = self.seq.load(Ordering::SeqCst) + 1;
        let record = LogRecord {
            seq,
            committed_at: Utc::now(),
            ops: ops.to_vec(),
        };
        let payload = bincode::serialize(&record)?;

        let start = file.seek(SeekFrom::End(0))?;
        let written = write_frame(&mut *file, &payload).and_then(|_| {
            if self.sync_writes {
                file.sync_data()
            } else {
                file.flush()
            }
        });
        if let Err(err) = written {
            // Leave no partial frame behind for the next append.
            if let Err(truncate_err) = file.set_len(start) {
                log::error!("failed to truncate commit log after write error: {truncate_err}");
            }
            return Err(err.into());
        }

        self.seq.store(seq, Ordering::SeqCst);
        self.records_since_checkpoint.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wants_checkpoint(&self) -> bool {
        self.records_since_checkpoint.load(Ordering::SeqCst) >= self.checkpoint_after
    }

    fn checkpoint(&self, mut snapshot: Snapshot) -> Result<()> {
        let mut file = self.file.lock();
        snapshot.last_seq = self.seq.load(Ordering::SeqCst);
        write_snapshot(&self.dir, &snapshot)?;

        // Records up to last_seq are now covered by the snapshot. A crash
        // before the truncation is harmless: they are skipped on replay.
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.records_since_checkpoint.store(0, Ordering::SeqCst);
        log::info!(
            "checkpointed {} terms and {} pairs at seq {}",
            snapshot.terms.len(),
            snapshot.pairs.len(),
            snapshot.last_seq
        );
        Ok(())
    }

    fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "log record too large")
    })?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_u32::<LittleEndian>(crc32fast::hash(payload))?;
    writer.write_all(payload)
}

/// Read all complete records, returning them and the length of the valid
/// prefix of the file.
fn read_records(file: &mut File) -> Result<(Vec<LogRecord>, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mut records = Vec::new();
    let mut offset = 0usize;
    while data.len() - offset >= FRAME_HEADER_LEN {
        let mut header = &data[offset..offset + FRAME_HEADER_LEN];
        let len = header.read_u32::<LittleEndian>()? as usize;
        let crc = header.read_u32::<LittleEndian>()?;

        let start = offset + FRAME_HEADER_LEN;
        let end = start + len;
        if end > data.len() {
            break;
        }
        let payload = &data[start..end];
        if crc32fast::hash(payload) != crc {
            if end == data.len() {
                // Last record, payload only partially flushed.
                break;
            }
            return Err(HindsightError::corruption(format!(
                "checksum mismatch in commit log record at byte {offset}"
            )));
        }

        let record: LogRecord = bincode::deserialize(payload)?;
        if let Some(previous) = records.last().map(|r: &LogRecord| r.seq)
            && record.seq <= previous
        {
            return Err(HindsightError::corruption(format!(
                "commit log sequence goes back from {previous} to {}",
                record.seq
            )));
        }
        records.push(record);
        offset = end;
    }
    Ok((records, offset as u64))
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    match std::fs::read(path) {
        Ok(bytes) => bincode::deserialize(&bytes).map_err(|e| {
            HindsightError::corruption(format!("unreadable snapshot {}: {e}", path.display()))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
        Err(err) => Err(err.into()),
    }
}

fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<()> {
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    let bytes = bincode::serialize(snapshot)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}
