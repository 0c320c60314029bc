use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;

/// Liveness state of a peer, as tracked by the local [`Context`](crate).
///
/// Transitions are driven entirely by `context::PeerIsolation` (see
/// spec.md §4.1); this type only enumerates the legal states and the
/// terminal-ness of `Isolated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Unknown,
    Checking,
    Running,
    Silent,
    Isolating,
    Isolated,
}

impl PeerState {
    /// `Isolated` is terminal for the run; no ingestion moves a peer out of it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Isolated)
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Per-peer liveness record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStatus {
    pub address: PeerAddress,
    pub state: PeerState,
    /// Monotonic sequence number reported by the peer in its last tick.
    pub remote_time: u64,
    /// Wall-clock time (unix seconds) this node last observed `remote_time`.
    pub local_time: u64,
}

impl PeerStatus {
    pub fn new(address: PeerAddress) -> Self {
        Self {
            address,
            state: PeerState::Unknown,
            remote_time: 0,
            local_time: 0,
        }
    }
}
