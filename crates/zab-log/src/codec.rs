//! Bit-exact encoding and decoding of one transaction record.
//!
//! The record layout is fixed: `epoch:i64 xid:i64 type:i32 body_len:i32`
//! followed by `body_len` body bytes, all integers big-endian. Encoding and
//! decoding are exact inverses; the same byte sequence is produced for the
//! same transaction on every platform.

use std::io::{self, Read};

use bytes::Bytes;
use zab_types::{Transaction, Zxid};

use crate::{LogError, LogResult};

/// Fixed record prefix: zxid (16) + type (4) + body length (4).
pub const HEADER_LEN: usize = Zxid::SERIALIZED_LEN + 4 + 4;

/// Encodes one transaction record into a byte vector.
pub fn encode(txn: &Transaction) -> Vec<u8> {
    let body = txn.body();
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());

    buf.extend_from_slice(&txn.zxid().epoch().to_be_bytes());
    buf.extend_from_slice(&txn.zxid().xid().to_be_bytes());
    buf.extend_from_slice(&txn.txn_type().to_be_bytes());
    buf.extend_from_slice(&(body.len() as i32).to_be_bytes());
    buf.extend_from_slice(body);

    buf
}

/// Decodes one transaction record from a reader.
///
/// Returns the transaction and the number of bytes consumed
/// (`HEADER_LEN + body_len`).
///
/// # Errors
///
/// - [`LogError::UnexpectedEof`] if EOF is hit before the 24-byte header or
///   before `body_len` body bytes have been read
/// - [`LogError::Malformed`] if the header carries a negative body length
pub fn decode(reader: &mut impl Read) -> LogResult<(Transaction, usize)> {
    let mut header = [0u8; HEADER_LEN];
    read_exact(reader, &mut header)?;

    let epoch = i64::from_be_bytes(header[0..8].try_into().unwrap());
    let xid = i64::from_be_bytes(header[8..16].try_into().unwrap());
    let txn_type = i32::from_be_bytes(header[16..20].try_into().unwrap());
    let body_len = i32::from_be_bytes(header[20..24].try_into().unwrap());

    if body_len < 0 {
        return Err(LogError::Malformed { body_len });
    }

    let mut body = vec![0u8; body_len as usize];
    read_exact(reader, &mut body)?;

    let txn = Transaction::new(Zxid::new(epoch, xid), txn_type, Bytes::from(body));
    Ok((txn, HEADER_LEN + body_len as usize))
}

/// `Read::read_exact` with EOF mapped to the log's own error kind.
fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> LogResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            LogError::UnexpectedEof
        } else {
            LogError::Io(e)
        }
    })
}
