//! Error types for transaction log operations.

use std::io;

use zab_types::Zxid;

/// Errors that can occur during transaction log operations.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    /// An append arrived with a zxid at or below the last appended one.
    /// The log is unchanged.
    #[error("transaction {zxid} does not follow last appended {last_seen}")]
    OutOfOrder { zxid: Zxid, last_seen: Zxid },

    /// The reader hit end-of-file inside a record. Indicates a partial
    /// trailing record that `truncate` can repair.
    #[error("unexpected end of file inside a record")]
    UnexpectedEof,

    /// The record header is impossible (negative body length).
    #[error("malformed record header: body length {body_len}")]
    Malformed { body_len: i32 },

    /// Underlying device error.
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),

    /// The operation is not implemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// The append handle was closed after a previous mid-record I/O
    /// failure; the log suffix must be repaired before reuse.
    #[error("log writer closed after an earlier I/O failure")]
    WriterClosed,
}

/// Result type for transaction log operations.
pub type LogResult<T> = Result<T, LogError>;
