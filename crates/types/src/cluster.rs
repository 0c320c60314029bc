use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;

/// Global cluster state, as driven by the cluster FSM (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    Initialization,
    Deployment,
    Operation,
    Conciliation,
    Restarting,
    ShuttingDown,
    Shutdown,
}

impl ClusterState {
    /// Legal direct transitions out of this state (spec.md §4.4).
    pub fn legal_transitions(self) -> &'static [ClusterState] {
        use ClusterState::*;

        match self {
            Initialization => &[Deployment],
            Deployment => &[Operation, Conciliation, Restarting, ShuttingDown],
            Operation => &[Conciliation, Initialization, Restarting, ShuttingDown],
            Conciliation => &[Operation, Initialization, Restarting, ShuttingDown],
            Restarting => &[Shutdown],
            ShuttingDown => &[Shutdown],
            Shutdown => &[],
        }
    }

    pub fn can_transition_to(self, next: ClusterState) -> bool {
        self == next || self.legal_transitions().contains(&next)
    }
}

/// Snapshot of cluster-wide state, published on the external bus whenever
/// the FSM changes state (spec.md §4.4, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupvisorsStatus {
    pub state: ClusterState,
    pub master_address: Option<PeerAddress>,
}

impl SupvisorsStatus {
    pub fn is_master(&self, self_address: &PeerAddress) -> bool {
        self.master_address.as_ref() == Some(self_address)
    }
}
