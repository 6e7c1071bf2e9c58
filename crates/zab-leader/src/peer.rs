//! The peer-handler seam between the processor and peer I/O threads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use zab_types::{ServerId, Zxid};

use crate::Message;

/// The interface the commit core requires of a peer's I/O handler.
///
/// Handlers are owned by the external orchestrator; the processor holds
/// non-owning references and never manages peer lifecycle. All methods
/// take `&self`: handlers are shared across threads and use interior
/// mutability for their ack state.
pub trait PeerHandler: Send + Sync {
    /// The peer's identity.
    fn server_id(&self) -> &ServerId;

    /// The largest zxid this peer has acknowledged, or `None` until the
    /// first ACK is observed.
    fn last_acked_zxid(&self) -> Option<Zxid>;

    /// Records the largest zxid this peer has acknowledged.
    fn set_last_acked_zxid(&self, zxid: Zxid);

    /// Enqueues an outbound message to this peer. May block on the
    /// peer's send queue.
    fn queue_message(&self, msg: Message);
}

/// The shared peer registry, populated by the orchestrator.
///
/// The processor only ever reads it (to lift peers into its working set
/// on JOIN and ACK_EPOCH); the orchestrator adds and removes entries as
/// connections come and go.
pub type QuorumRegistry = Arc<RwLock<HashMap<ServerId, Arc<dyn PeerHandler>>>>;
