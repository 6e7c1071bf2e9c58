//! # zab-types: Core types for the Zab broadcast core
//!
//! This crate contains the shared types used across the system:
//! - Transaction identifiers ([`Zxid`])
//! - Peer identities ([`ServerId`])
//! - Replicated transactions ([`Transaction`])

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// Transaction Identifier - Copy (16-byte value)
// ============================================================================

/// Composite transaction identifier: `(epoch, xid)`.
///
/// Every transaction accepted by the leader is tagged with a zxid. Zxids are
/// totally ordered, lexicographically on `(epoch, xid)`: all transactions of
/// an earlier epoch order before all transactions of a later one, and within
/// an epoch the xid counter orders them.
///
/// Fields are signed so that the [`Zxid::NOT_EXIST`] sentinel `(-1, -1)`
/// orders strictly below every real zxid; real zxids are non-negative.
///
/// # Invariants
///
/// - Within one log, successively appended zxids strictly increase
/// - The on-disk width of a zxid is fixed at [`Zxid::SERIALIZED_LEN`] bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Zxid {
    epoch: i64,
    xid: i64,
}

impl Zxid {
    /// Sentinel zxid that compares strictly less than every real zxid.
    ///
    /// Used where "no transaction has been seen yet" must participate in
    /// comparisons: an empty log, a peer that has not acknowledged anything.
    pub const NOT_EXIST: Zxid = Zxid { epoch: -1, xid: -1 };

    /// Serialized width of a zxid: two big-endian `i64`s.
    pub const SERIALIZED_LEN: usize = 16;

    /// Creates a new zxid.
    pub fn new(epoch: i64, xid: i64) -> Self {
        Self { epoch, xid }
    }

    /// Returns the epoch component.
    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    /// Returns the xid component.
    pub fn xid(&self) -> i64 {
        self.xid
    }

    /// Returns true if this is the [`Zxid::NOT_EXIST`] sentinel.
    pub fn is_not_exist(&self) -> bool {
        *self == Zxid::NOT_EXIST
    }

    /// Returns the zxid immediately before this one within the same epoch.
    ///
    /// For the first transaction of an epoch `(e, 0)` this is `(e, -1)`,
    /// which orders below every real zxid of epoch `e`.
    pub fn prev_in_epoch(&self) -> Zxid {
        Zxid {
            epoch: self.epoch,
            xid: self.xid - 1,
        }
    }
}

impl Display for Zxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.epoch, self.xid)
    }
}

impl From<(i64, i64)> for Zxid {
    fn from((epoch, xid): (i64, i64)) -> Self {
        Self::new(epoch, xid)
    }
}

// ============================================================================
// Server Identifier - Clone (owned string)
// ============================================================================

/// Identity of a peer in the ensemble.
///
/// Peer identities are opaque strings assigned by the deployment
/// (conventionally `host:port`). They never change for the lifetime of a
/// peer and are used as map keys throughout the leader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a new server identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ServerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Transaction - Clone (body is cheaply-cloned Bytes)
// ============================================================================

/// A single replicated transaction: `{zxid, type, body}`.
///
/// Transactions are immutable after construction. The body is an opaque
/// payload owned by the state machine above; the broadcast core never
/// interprets it. Body length is bounded by the positive `i32` range, the
/// widest length the on-disk record header can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    zxid: Zxid,
    txn_type: i32,
    body: Bytes,
}

impl Transaction {
    /// Creates a new transaction.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the body exceeds `i32::MAX` bytes.
    pub fn new(zxid: Zxid, txn_type: i32, body: Bytes) -> Self {
        debug_assert!(
            body.len() <= i32::MAX as usize,
            "transaction body exceeds i32 range"
        );
        Self {
            zxid,
            txn_type,
            body,
        }
    }

    /// Returns the transaction identifier.
    pub fn zxid(&self) -> Zxid {
        self.zxid
    }

    /// Returns the transaction type tag.
    pub fn txn_type(&self) -> i32 {
        self.txn_type
    }

    /// Returns the transaction body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
