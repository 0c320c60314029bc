use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::PeerAddress;
use crate::application::RunningFailureStrategy;

/// A `group:name` process identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespec {
    pub group: String,
    pub name: String,
}

#[derive(Debug, Error)]
#[error("namespec must be formatted as `group:name`, got {0:?}")]
pub struct NamespecParseError(String);

impl Namespec {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Namespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl std::str::FromStr for Namespec {
    type Err = NamespecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, name) = s
            .split_once(':')
            .ok_or_else(|| NamespecParseError(s.to_owned()))?;

        if group.is_empty() || name.is_empty() {
            return Err(NamespecParseError(s.to_owned()));
        }

        Ok(Self::new(group, name))
    }
}

/// Observed run state of a single process, as reported by a peer's local
/// process manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    Unknown,
}

impl ProcessState {
    /// Whether this state counts towards the conflict predicate
    /// (spec.md §3: "simultaneously in a running substate").
    pub fn is_running_substate(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

/// What a single peer reports about one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProcessInfo {
    pub state: ProcessState,
    pub start_time: Option<u64>,
    pub stop_time: Option<u64>,
    pub extra_args: String,
}

impl LocalProcessInfo {
    pub fn new(state: ProcessState) -> Self {
        Self {
            state,
            start_time: None,
            stop_time: None,
            extra_args: String::new(),
        }
    }
}

/// Per-process observed state across every peer that has reported on it.
///
/// Created on first `load_processes` or process event from any peer;
/// never removed during a run (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub namespec: Namespec,
    pub application_name: String,
    pub entries: BTreeMap<PeerAddress, LocalProcessInfo>,
    /// Inherited from the owning application at creation time (spec.md §4.3).
    pub running_failure_strategy: RunningFailureStrategy,
    /// Default extra args loaded from the process rules at creation time.
    pub default_extra_args: String,
}

impl ProcessStatus {
    pub fn new(
        namespec: Namespec,
        application_name: impl Into<String>,
        running_failure_strategy: RunningFailureStrategy,
        default_extra_args: impl Into<String>,
    ) -> Self {
        Self {
            namespec,
            application_name: application_name.into(),
            entries: BTreeMap::new(),
            running_failure_strategy,
            default_extra_args: default_extra_args.into(),
        }
    }

    /// True iff two or more entries are simultaneously in a running substate,
    /// i.e. the same required program is live on two or more peers.
    pub fn conflicting(&self) -> bool {
        self.entries
            .values()
            .filter(|info| info.state.is_running_substate())
            .count()
            >= 2
    }

    /// Addresses currently reporting the process as live.
    pub fn running_peers(&self) -> impl Iterator<Item = &PeerAddress> {
        self.entries
            .iter()
            .filter(|(_, info)| info.state.is_running_substate())
            .map(|(addr, _)| addr)
    }

    /// Invalidate the entry hosted on `peer` because that peer left `Running`.
    ///
    /// Returns the entry as it stood before invalidation if it was itself in
    /// a running substate, which is what drives the required-process
    /// failure handler.
    pub fn invalidate_peer(&mut self, peer: &PeerAddress) -> Option<LocalProcessInfo> {
        let entry = self.entries.get_mut(peer)?;
        let was_running = entry.state.is_running_substate();
        let previous = entry.clone();
        entry.state = ProcessState::Unknown;

        was_running.then_some(previous)
    }
}
