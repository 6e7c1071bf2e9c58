//! Protocol events consumed and produced by the acknowledgment processor.
//!
//! Decoding of the wire envelope happens in the transport layer; the
//! processor receives already-decoded [`Message`] values wrapped in a
//! [`MessageTuple`] that names the peer the event came from.
//!
//! Events the processor acts on:
//! - [`Message::Ack`] - a peer acknowledged everything up to a zxid
//! - [`Message::Join`] - a peer asks to be added to the membership
//! - [`Message::AckEpoch`] - a peer finished epoch negotiation
//! - [`Message::Disconnected`] - a peer's connection dropped
//! - [`Message::Remove`] - a peer is to be removed from the membership
//!
//! The processor produces [`Message::Commit`]. Any other envelope type
//! reaching the processor is logged and ignored.

use zab_types::{ServerId, Transaction, Zxid};

// ============================================================================
// Message Envelope
// ============================================================================

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Peer → Leader: everything up to `zxid` is persisted on my log.
    Ack { zxid: Zxid },

    /// Peer → Leader: add me to the membership.
    Join,

    /// Peer → Leader: epoch negotiation finished, I am following you.
    AckEpoch,

    /// Transport → Leader: the connection to a peer dropped.
    Disconnected { server_id: ServerId },

    /// Admin → Leader: remove a peer from the membership.
    Remove { server_id: ServerId },

    /// Leader → Peer: transactions up to `zxid` are committed.
    Commit { zxid: Zxid },

    /// Leader → Peer: replicate this transaction. Not handled by the
    /// acknowledgment processor.
    Proposal { txn: Transaction },

    /// Keep-alive. Not handled by the acknowledgment processor.
    Heartbeat,
}

impl Message {
    /// Returns a human-readable name for the message type.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Ack { .. } => "ACK",
            Message::Join => "JOIN",
            Message::AckEpoch => "ACK_EPOCH",
            Message::Disconnected { .. } => "DISCONNECTED",
            Message::Remove { .. } => "REMOVE",
            Message::Commit { .. } => "COMMIT",
            Message::Proposal { .. } => "PROPOSAL",
            Message::Heartbeat => "HEARTBEAT",
        }
    }
}

// ============================================================================
// Message Tuple
// ============================================================================

/// A message together with its source peer and, for reconfiguration
/// events, the zxid assigned to the installing transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTuple {
    /// The peer this event came from.
    pub server_id: ServerId,

    /// The decoded message.
    pub message: Message,

    /// Zxid attached to the event by the proposal pipeline. Present for
    /// JOIN and REMOVE, where it versions the pending configuration.
    pub zxid: Option<Zxid>,
}

impl MessageTuple {
    /// Creates a tuple with no attached zxid.
    pub fn new(server_id: ServerId, message: Message) -> Self {
        Self {
            server_id,
            message,
            zxid: None,
        }
    }

    /// Creates a tuple carrying the zxid of a reconfiguration
    /// transaction.
    pub fn with_zxid(server_id: ServerId, message: Message, zxid: Zxid) -> Self {
        Self {
            server_id,
            message,
            zxid: Some(zxid),
        }
    }
}
