//! The acknowledgment processing loop.
//!
//! [`AckProcessor`] consumes decoded protocol events from a bounded FIFO
//! queue on a dedicated worker thread, tracks each peer's latest
//! acknowledged zxid, and broadcasts COMMIT whenever the quorum commit
//! point advances.
//!
//! # Threading Model
//!
//! All processor state is read and mutated only by the worker thread, so
//! no locking is needed around it. Producers (peer I/O threads) enqueue
//! events through [`AckProcessorHandle::process_request`]; shutdown is
//! cooperative via a sentinel request, and
//! [`AckProcessorHandle::shutdown`] joins the worker and surfaces its
//! termination result.
//!
//! # Reconfiguration Safety
//!
//! A JOIN or REMOVE proposes a new configuration versioned by the zxid of
//! its installing transaction. Until that transaction commits under a
//! quorum of the *new* membership, the commit point computed under the old
//! membership is capped one below the reconfiguration zxid: committing at
//! or past the membership change with only the old quorum would break the
//! overlap guarantee between consecutive configurations.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};
use zab_types::{ServerId, Zxid};

use crate::config::{ClusterConfiguration, ProcessorConfig};
use crate::message::{Message, MessageTuple};
use crate::peer::{PeerHandler, QuorumRegistry};
use crate::{ProcessorError, ProcessorResult};

// ============================================================================
// Requests
// ============================================================================

/// Internal queue entry: an event, or the shutdown sentinel.
enum Request {
    Message(MessageTuple),
    Shutdown,
}

// ============================================================================
// Commit Point
// ============================================================================

/// Returns the largest zxid acknowledged by a quorum: the
/// `quorum_size`-th largest of `acked`, or `fallback` when fewer than
/// `quorum_size` acknowledgments exist.
pub(crate) fn quorum_commit_point(mut acked: Vec<Zxid>, quorum_size: usize, fallback: Zxid) -> Zxid {
    if acked.len() < quorum_size {
        // Not enough acknowledgments for any transaction to be committed.
        return fallback;
    }
    acked.sort_unstable();
    acked[acked.len() - quorum_size]
}

// ============================================================================
// Ack Processor
// ============================================================================

/// The leader's commit-decision worker.
///
/// Owns a private working copy of the peer set, the committed cluster
/// configuration, at most one pending configuration, and the last zxid a
/// COMMIT was broadcast for.
///
/// # Invariants
///
/// - `last_committed_zxid` is monotonically non-decreasing
/// - At most one pending configuration exists at any time
/// - COMMIT broadcasts carry non-decreasing zxids
pub struct AckProcessor {
    /// The orchestrator's peer registry. Read-only from here.
    registry: QuorumRegistry,

    /// Working peer set: the peers whose acknowledgments count and that
    /// receive COMMIT broadcasts.
    quorum_set: HashMap<ServerId, Arc<dyn PeerHandler>>,

    /// The committed cluster configuration.
    cluster_config: ClusterConfiguration,

    /// The uncommitted reconfiguration, if one is in flight.
    pending_config: Option<ClusterConfiguration>,

    /// Last zxid a COMMIT was broadcast for; avoids duplicate COMMITs.
    last_committed_zxid: Zxid,

    request_rx: Receiver<Request>,
}

impl AckProcessor {
    /// Starts the worker thread and returns its control handle.
    ///
    /// The working peer set is initialized as a copy of the registry's
    /// current contents.
    pub fn spawn(
        registry: QuorumRegistry,
        cluster_config: ClusterConfiguration,
        last_committed_zxid: Zxid,
        config: ProcessorConfig,
    ) -> AckProcessorHandle {
        let (request_tx, request_rx) = mpsc::sync_channel(config.queue_capacity);

        let quorum_set = registry
            .read()
            .map(|peers| peers.clone())
            .unwrap_or_default();

        let processor = Self {
            registry,
            quorum_set,
            cluster_config,
            pending_config: None,
            last_committed_zxid,
            request_rx,
        };
        let worker = thread::spawn(move || processor.run());

        AckProcessorHandle { request_tx, worker }
    }

    fn run(mut self) -> ProcessorResult<()> {
        debug!("ack processor started");
        let result = self.process_loop();
        if let Err(e) = &result {
            error!(error = %e, "ack processor terminating");
        }
        debug!("ack processor shut down");
        result
    }

    fn process_loop(&mut self) -> ProcessorResult<()> {
        // A closed queue (every handle dropped) ends the loop like the
        // sentinel does.
        while let Ok(request) = self.request_rx.recv() {
            match request {
                Request::Shutdown => break,
                Request::Message(tuple) => self.handle_tuple(tuple)?,
            }
        }
        Ok(())
    }

    fn handle_tuple(&mut self, tuple: MessageTuple) -> ProcessorResult<()> {
        let source = tuple.server_id;
        match tuple.message {
            Message::Ack { zxid } => self.on_ack(&source, zxid),
            Message::Join => {
                self.lift_from_registry(&source);
                let Some(version) = tuple.zxid else {
                    warn!(%source, "JOIN without a reconfiguration zxid, ignoring");
                    return Ok(());
                };
                debug!(%source, %version, "got JOIN");
                let mut next = self.cluster_config.clone();
                next.add_peer(source.clone());
                self.install_pending(source, next, version)?;
            }
            Message::AckEpoch => {
                debug!(%source, "got ACK_EPOCH");
                self.lift_from_registry(&source);
            }
            Message::Disconnected { server_id } => {
                debug!(peer = %server_id, "got DISCONNECTED");
                self.quorum_set.remove(&server_id);
            }
            Message::Remove { server_id } => {
                let Some(version) = tuple.zxid else {
                    warn!(%source, "REMOVE without a reconfiguration zxid, ignoring");
                    return Ok(());
                };
                debug!(peer = %server_id, %version, "got REMOVE");
                let mut next = self.cluster_config.clone();
                next.remove_peer(&server_id);
                self.install_pending(server_id, next, version)?;
            }
            other => {
                warn!(%source, message = other.name(), "ignoring unexpected message");
            }
        }
        Ok(())
    }

    /// Records a peer acknowledgment and advances the commit point.
    fn on_ack(&mut self, source: &ServerId, zxid: Zxid) {
        debug!(%zxid, %source, "got ACK");
        let Some(peer) = self.quorum_set.get(source) else {
            warn!(%source, "ACK from a peer outside the working set, ignoring");
            return;
        };
        peer.set_last_acked_zxid(zxid);

        // With a reconfiguration in flight, first check whether the new
        // membership has itself reached quorum at or past its installing
        // transaction; if so the pending configuration becomes current.
        let mut commit_point = None;
        if let Some(pending) = self.pending_config.clone() {
            let z = self.committed_zxid(&pending);
            debug!(%z, pending_version = %pending.version(), "pending configuration commit point");
            if z >= pending.version() {
                self.cluster_config = pending;
                self.pending_config = None;
                commit_point = Some(z);
            }
        }

        let z = match commit_point {
            Some(z) => z,
            None => {
                let mut z = self.committed_zxid(&self.cluster_config);
                if let Some(pending) = &self.pending_config {
                    if z >= pending.version() {
                        // The old quorum must not commit at or past the
                        // membership change; cap one below it.
                        z = pending.version().prev_in_epoch();
                    }
                }
                z
            }
        };

        debug!(%z, "commit point");
        if z > self.last_committed_zxid {
            debug!(%z, peers = self.quorum_set.len(), "broadcasting COMMIT");
            let commit = Message::Commit { zxid: z };
            for peer in self.quorum_set.values() {
                peer.queue_message(commit.clone());
            }
            self.last_committed_zxid = z;
        }
    }

    /// The largest zxid acknowledged by a quorum of `cfg`, counting only
    /// working-set peers that are members and have acknowledged at least
    /// once. Returns `last_committed_zxid` when no quorum has formed.
    fn committed_zxid(&self, cfg: &ClusterConfiguration) -> Zxid {
        let acked: Vec<Zxid> = self
            .quorum_set
            .values()
            .filter(|peer| cfg.contains(peer.server_id()))
            .filter_map(|peer| peer.last_acked_zxid())
            .collect();
        quorum_commit_point(acked, cfg.quorum_size(), self.last_committed_zxid)
    }

    /// Installs a pending configuration, failing if one already exists.
    fn install_pending(
        &mut self,
        server_id: ServerId,
        next: ClusterConfiguration,
        version: Zxid,
    ) -> ProcessorResult<()> {
        if let Some(pending) = &self.pending_config {
            error!(
                %server_id,
                pending_version = %pending.version(),
                "reconfiguration already in flight"
            );
            return Err(ProcessorError::ConcurrentReconfig {
                server_id,
                pending_version: pending.version(),
            });
        }
        let mut next = next;
        next.set_version(version);
        self.pending_config = Some(next);
        Ok(())
    }

    /// Copies a peer handle from the shared registry into the working
    /// set. A peer missing from the registry is skipped.
    fn lift_from_registry(&mut self, source: &ServerId) {
        let handler = self
            .registry
            .read()
            .ok()
            .and_then(|peers| peers.get(source).cloned());
        if let Some(handler) = handler {
            self.quorum_set.insert(source.clone(), handler);
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Owner-side control surface for a running [`AckProcessor`].
///
/// Producers enqueue events with
/// [`AckProcessorHandle::process_request`]; the owner ends the worker
/// with [`AckProcessorHandle::shutdown`]. Dropping the handle without
/// calling `shutdown` also ends the worker (its queue closes), but
/// discards the termination result.
pub struct AckProcessorHandle {
    request_tx: SyncSender<Request>,
    worker: JoinHandle<ProcessorResult<()>>,
}

impl AckProcessorHandle {
    /// Enqueues an event for the worker. Blocks while the queue is full.
    ///
    /// # Errors
    ///
    /// [`ProcessorError::NotRunning`] if the worker has terminated.
    pub fn process_request(&self, request: MessageTuple) -> ProcessorResult<()> {
        self.request_tx
            .send(Request::Message(request))
            .map_err(|_| ProcessorError::NotRunning)
    }

    /// Enqueues the shutdown sentinel and joins the worker.
    ///
    /// All events enqueued before the call are processed first. Returns
    /// the worker's termination result: `Ok(())` after a clean shutdown,
    /// or the fatal error that ended the loop early.
    pub fn shutdown(self) -> ProcessorResult<()> {
        // A send failure means the worker already stopped; the join
        // result carries the reason.
        let _ = self.request_tx.send(Request::Shutdown);
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::NotRunning),
        }
    }
}

impl std::fmt::Debug for AckProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckProcessorHandle").finish_non_exhaustive()
    }
}
