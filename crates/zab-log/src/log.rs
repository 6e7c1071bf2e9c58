//! Append-only transaction journal.
//!
//! [`FileLog`] owns a single log file and its append handle. Reads go
//! through [`FileLogIterator`], which holds its own read handle and a byte
//! cursor; iterators see the file as it was when they were opened.
//!
//! # Invariants
//!
//! - Appended zxids strictly increase within one log
//! - The file is only ever extended by `append` and shortened by `truncate`
//! - A mid-record append failure poisons the writer; the suffix must be
//!   repaired via `truncate` before the log is reopened for writing

use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};
use zab_types::{Transaction, Zxid};

use crate::codec;
use crate::{LogError, LogResult};

// ============================================================================
// Log Interface
// ============================================================================

/// The journal interface consumed by the layers above the broadcast core.
///
/// Higher layers (the proposal pipeline, recovery) depend on this trait
/// rather than on [`FileLog`] directly so that tests and future storage
/// backends can substitute their own journal.
pub trait Log {
    /// Iterator type produced by [`Log::iter_from`].
    type Iter: Iterator<Item = LogResult<Transaction>>;

    /// Appends a transaction. The zxid must be strictly greater than the
    /// last appended one. Durability requires a subsequent [`Log::sync`].
    fn append(&mut self, txn: &Transaction) -> LogResult<()>;

    /// Flushes userspace buffers and syncs data to the device.
    fn sync(&mut self) -> LogResult<()>;

    /// Returns the zxid of the latest appended transaction, or
    /// [`Zxid::NOT_EXIST`] for an empty log.
    fn latest_zxid(&self) -> Zxid;

    /// Returns an iterator positioned so that the first transaction
    /// produced has a zxid >= `zxid`.
    fn iter_from(&self, zxid: Zxid) -> LogResult<Self::Iter>;

    /// Removes every record whose zxid is strictly greater than `zxid`.
    fn truncate(&mut self, zxid: Zxid) -> LogResult<()>;

    /// Discards the prefix of the log up to `zxid` inclusive.
    ///
    /// Reserved for a future compaction design; fails with
    /// [`LogError::Unsupported`].
    fn trim(&mut self, zxid: Zxid) -> LogResult<()>;
}

// ============================================================================
// File-Backed Log
// ============================================================================

/// Append-only transaction journal backed by a single file.
///
/// The log keeps one buffered append handle and a cached
/// `last_seen_zxid`. Appends reach the OS on each call but reach the
/// device only on [`Log::sync`]. Dropping the log guarantees no
/// durability; callers sync first when it matters.
///
/// Single-writer: callers serialize appends. Iterators may coexist with
/// the writer only while appends are quiesced (recovery, truncation).
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    /// Buffered append handle. `None` after a mid-record I/O failure.
    writer: Option<BufWriter<File>>,
    last_seen_zxid: Zxid,
}

impl FileLog {
    /// Opens the log, preserving any existing contents.
    ///
    /// Recovers `last_seen_zxid` by scanning the file to its last record;
    /// an empty file recovers to [`Zxid::NOT_EXIST`].
    ///
    /// # Errors
    ///
    /// Returns [`LogError::UnexpectedEof`] if the file ends inside a
    /// record. The log is not opened; the caller decides whether to repair
    /// the tail by reopening with a hint and calling
    /// [`Log::truncate`], or to discard the file.
    pub fn open(path: impl Into<PathBuf>) -> LogResult<Self> {
        let path = path.into();
        let last_seen = Self::recover_latest_zxid(&path)?;
        Self::open_inner(path, last_seen)
    }

    /// Opens the log with a caller-supplied `last_seen_zxid`, skipping the
    /// recovery scan.
    ///
    /// The fast path for callers that already know the tail of the log,
    /// and the repair path for a log whose trailing record is partial.
    pub fn open_with_last_zxid(path: impl Into<PathBuf>, last_seen: Zxid) -> LogResult<Self> {
        Self::open_inner(path.into(), last_seen)
    }

    fn open_inner(path: PathBuf, last_seen: Zxid) -> LogResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), last_seen = %last_seen, "transaction log opened");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            last_seen_zxid: last_seen,
        })
    }

    /// Scans the file to its end and returns the last record's zxid.
    fn recover_latest_zxid(path: &Path) -> LogResult<Zxid> {
        if !path.exists() {
            return Ok(Zxid::NOT_EXIST);
        }
        let mut iter = FileLogIterator::open(path)?;
        let mut latest = Zxid::NOT_EXIST;
        while iter.has_next() {
            latest = iter.next_txn()?.zxid();
        }
        Ok(latest)
    }

    /// Returns the log file name, if representable.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Returns the current length of the log file in bytes.
    pub fn length(&self) -> LogResult<u64> {
        Ok(self.path.metadata()?.len())
    }
}

impl Log for FileLog {
    type Iter = FileLogIterator;

    /// Appends a transaction to the log.
    ///
    /// The record is written to the buffered handle and flushed to the OS;
    /// it is not durable until [`Log::sync`] returns.
    ///
    /// # Errors
    ///
    /// - [`LogError::OutOfOrder`] if the zxid does not follow
    ///   `last_seen_zxid`; the log is unchanged
    /// - [`LogError::Io`] on a device error; the record may be partially
    ///   written, so the writer is closed and later appends fail with
    ///   [`LogError::WriterClosed`] until the suffix is repaired
    fn append(&mut self, txn: &Transaction) -> LogResult<()> {
        if txn.zxid() <= self.last_seen_zxid {
            error!(
                zxid = %txn.zxid(),
                last_seen = %self.last_seen_zxid,
                "rejecting out-of-order append"
            );
            return Err(LogError::OutOfOrder {
                zxid: txn.zxid(),
                last_seen: self.last_seen_zxid,
            });
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(LogError::WriterClosed);
        };

        let record = codec::encode(txn);
        let result = writer.write_all(&record).and_then(|()| writer.flush());
        if let Err(e) = result {
            // The suffix may hold a partial record now. Close the handle so
            // nothing else is written past the corruption point.
            self.writer = None;
            return Err(LogError::Io(e));
        }

        self.last_seen_zxid = txn.zxid();
        Ok(())
    }

    /// Syncs all appended records to the physical device.
    ///
    /// After this returns, every previously appended record is durable.
    fn sync(&mut self) -> LogResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(LogError::WriterClosed);
        };
        writer.flush()?;
        // Data-sync is sufficient: record contents and file length, not
        // metadata timestamps.
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn latest_zxid(&self) -> Zxid {
        self.last_seen_zxid
    }

    /// Returns an iterator positioned at the first record with
    /// zxid >= `zxid`, or at EOF if no such record exists.
    fn iter_from(&self, zxid: Zxid) -> LogResult<FileLogIterator> {
        let mut iter = FileLogIterator::open(&self.path)?;
        while iter.has_next() {
            let txn = iter.next_txn()?;
            if txn.zxid() >= zxid {
                iter.backward()?;
                break;
            }
        }
        Ok(iter)
    }

    /// Truncates the log, dropping every record with zxid > `zxid`.
    ///
    /// Keeps all records up to and including the first record whose zxid
    /// equals `zxid`; if `zxid` is absent but a greater record exists,
    /// keeps everything below it. Updates `last_seen_zxid` to the last
    /// kept record, or [`Zxid::NOT_EXIST`] if nothing is kept.
    ///
    /// Not crash-atomic; callers treat this as an offline/recovery
    /// operation.
    fn truncate(&mut self, zxid: Zxid) -> LogResult<()> {
        self.last_seen_zxid = Zxid::NOT_EXIST;
        let mut iter = FileLogIterator::open(&self.path)?;
        while iter.has_next() {
            let txn = iter.next_txn()?;
            match txn.zxid().cmp(&zxid) {
                Ordering::Equal => {
                    self.last_seen_zxid = txn.zxid();
                    break;
                }
                Ordering::Greater => {
                    iter.backward()?;
                    break;
                }
                Ordering::Less => {
                    self.last_seen_zxid = txn.zxid();
                }
            }
        }
        if iter.has_next() {
            debug!(
                zxid = %zxid,
                position = iter.position(),
                "truncating log suffix"
            );
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(iter.position())?;
        }
        Ok(())
    }

    fn trim(&mut self, _zxid: Zxid) -> LogResult<()> {
        Err(LogError::Unsupported("trim"))
    }
}

// ============================================================================
// Log Iterator
// ============================================================================

/// Positioned reader over the records of a log file.
///
/// The iterator owns a separate read handle and sees the file as it was at
/// open time: [`FileLogIterator::has_next`] compares the byte cursor
/// against the length captured when the iterator was created, so appends
/// made afterwards are not observed.
///
/// [`FileLogIterator::backward`] steps back exactly one record; it is
/// supported at most once after each decoded record.
#[derive(Debug)]
pub struct FileLogIterator {
    reader: BufReader<File>,
    /// File length captured at open; the iterator never reads past it.
    file_len: u64,
    /// Byte offset of the next record to decode.
    position: u64,
    /// Length of the most recently decoded record; zero after `backward`.
    last_record_len: u64,
}

impl FileLogIterator {
    pub(crate) fn open(path: &Path) -> LogResult<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            file_len,
            position: 0,
            last_record_len: 0,
        })
    }

    /// Returns true if the cursor has not reached the end of the file as
    /// captured at open time.
    pub fn has_next(&self) -> bool {
        self.position < self.file_len
    }

    /// Decodes the record at the cursor and advances past it.
    ///
    /// # Errors
    ///
    /// [`LogError::UnexpectedEof`] if the file ends inside the record.
    pub fn next_txn(&mut self) -> LogResult<Transaction> {
        let (txn, len) = codec::decode(&mut self.reader)?;
        self.last_record_len = len as u64;
        self.position += len as u64;
        Ok(txn)
    }

    /// Steps the cursor back over the most recently decoded record and
    /// re-seeks the reader.
    ///
    /// Only one step back is supported per decoded record; a second call
    /// before the next [`FileLogIterator::next_txn`] is a no-op.
    pub fn backward(&mut self) -> LogResult<()> {
        self.position -= self.last_record_len;
        self.reader.seek(SeekFrom::Start(self.position))?;
        self.last_record_len = 0;
        Ok(())
    }

    /// Returns the byte offset of the next record to decode.
    ///
    /// After scanning to a cut point, this is the length `truncate` sets
    /// the file to.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for FileLogIterator {
    type Item = LogResult<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_txn())
    }
}
