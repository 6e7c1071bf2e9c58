//! Cluster membership and processor configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use zab_types::{ServerId, Zxid};

// ============================================================================
// Cluster Configuration
// ============================================================================

/// A membership snapshot, versioned by the zxid that installs it.
///
/// Configurations are values: a reconfiguration clones the current one,
/// mutates the copy, and stamps it with the zxid of the installing
/// transaction. The committed configuration is only replaced once that
/// transaction is itself committed under the new membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    members: BTreeSet<ServerId>,
    /// Zxid of the transaction that installs this configuration.
    version: Zxid,
}

impl ClusterConfiguration {
    /// Creates a configuration from a member list.
    pub fn new(members: impl IntoIterator<Item = ServerId>, version: Zxid) -> Self {
        Self {
            members: members.into_iter().collect(),
            version,
        }
    }

    /// Returns the zxid that installs this configuration.
    pub fn version(&self) -> Zxid {
        self.version
    }

    /// Stamps the configuration with the zxid of its installing
    /// transaction.
    pub fn set_version(&mut self, version: Zxid) {
        self.version = version;
    }

    /// Returns true if the peer is a member of this configuration.
    pub fn contains(&self, id: &ServerId) -> bool {
        self.members.contains(id)
    }

    /// Returns the majority size for this membership:
    /// `floor(n / 2) + 1`.
    pub fn quorum_size(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the configuration has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds a peer to the membership.
    pub fn add_peer(&mut self, id: ServerId) {
        self.members.insert(id);
    }

    /// Removes a peer from the membership.
    pub fn remove_peer(&mut self, id: &ServerId) {
        self.members.remove(id);
    }
}

// ============================================================================
// Processor Configuration
// ============================================================================

/// Configuration for the acknowledgment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Capacity of the inbound event queue. Producers block once the
    /// queue is full.
    pub queue_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
        }
    }
}
