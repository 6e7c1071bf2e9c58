//! # zab-log: Append-only transaction log
//!
//! This crate implements the leader's durable transaction journal. Totally
//! ordered transactions are appended to a single log file, synced on demand,
//! and read back during recovery through a positioned iterator.
//!
//! # Record Format
//!
//! Each transaction is stored as one record:
//!
//! ```text
//! [epoch:i64][xid:i64][type:i32][body_len:i32][body:bytes]
//!     8B         8B       4B         4B          variable
//! ```
//!
//! All integers are big-endian. The fixed prefix is 24 bytes; a record is
//! `24 + body_len` bytes long. The file is a bare concatenation of records:
//! no magic, no checksum, no trailer.
//!
//! # Example
//!
//! ```ignore
//! use zab_log::{FileLog, Log};
//! use zab_types::{Transaction, Zxid};
//! use bytes::Bytes;
//!
//! let mut log = FileLog::open("/data/txn.log")?;
//! log.append(&Transaction::new(Zxid::new(0, 1), 0, Bytes::from("a")))?;
//! log.sync()?;
//!
//! // Replay everything from the beginning.
//! for txn in log.iter_from(Zxid::NOT_EXIST)? {
//!     let txn = txn?;
//!     // ...
//! }
//! ```

pub mod codec;
mod error;
mod log;

pub use error::{LogError, LogResult};
pub use log::{FileLog, FileLogIterator, Log};
