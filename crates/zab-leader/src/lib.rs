//! # zab-leader: Leader-side commit decision loop
//!
//! This crate implements the leader's acknowledgment processing for a
//! Zab-style atomic broadcast. Peer I/O threads deposit decoded protocol
//! events into the [`AckProcessor`]'s queue; the processor tracks each
//! peer's latest acknowledged zxid, computes the largest zxid a quorum of
//! the current (and any pending) configuration has acknowledged, broadcasts
//! COMMIT to the working set, and drives single-step reconfiguration.
//!
//! ## Architecture
//!
//! ```text
//! Peer I/O threads                AckProcessor worker
//!       │                                │
//!       │  process_request(tuple)        │
//!       ├───────────────────────────────►│  update peer ack state
//!       │                                │  recompute commit point
//!       │                                │  check reconfig barrier
//!       │         queue_message(COMMIT)  │
//!       │◄───────────────────────────────┤
//! ```
//!
//! ## Key Components
//!
//! - [`ClusterConfiguration`]: membership snapshot versioned by the zxid
//!   that installs it
//! - [`PeerHandler`]: the interface the core requires of peer I/O threads
//! - [`Message`] / [`MessageTuple`]: the decoded protocol envelope
//! - [`AckProcessor`] / [`AckProcessorHandle`]: the worker and its owner-side
//!   control surface

mod config;
mod message;
mod peer;
mod processor;

pub use config::{ClusterConfiguration, ProcessorConfig};
pub use message::{Message, MessageTuple};
pub use peer::{PeerHandler, QuorumRegistry};
pub use processor::{AckProcessor, AckProcessorHandle};

use zab_types::{ServerId, Zxid};

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the acknowledgment processor.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// A JOIN or REMOVE arrived while another reconfiguration was still
    /// pending. The worker terminates; only one membership change may be
    /// in flight at a time.
    #[error(
        "reconfiguration for {server_id} arrived while one is pending at version {pending_version}"
    )]
    ConcurrentReconfig {
        server_id: ServerId,
        pending_version: Zxid,
    },

    /// The worker is no longer running (its queue is closed or the thread
    /// terminated abnormally).
    #[error("ack processor is not running")]
    NotRunning,
}

/// Result type for processor operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[cfg(test)]
mod tests;
