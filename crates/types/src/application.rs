use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::process::{Namespec, ProcessStatus};

/// Strategy applied when a required process of a running application dies
/// unexpectedly (spec.md §4.1, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningFailureStrategy {
    Continue,
    RestartProcess,
    StopApplication,
}

impl Default for RunningFailureStrategy {
    fn default() -> Self {
        Self::Continue
    }
}

/// Rules loaded once, at application creation, from the rules collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ApplicationRules {
    pub start_sequence: u32,
    pub running_failure_strategy: RunningFailureStrategy,
}

/// Rules loaded once, at process creation, from the rules collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRules {
    pub extra_args: String,
}

/// A set of process statuses grouped by application name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub name: String,
    pub rules: ApplicationRules,
    pub processes: BTreeMap<Namespec, ProcessStatus>,
    /// Namespecs with a start/stop currently in flight, so the failure
    /// handler can skip processes the Deployer/Stopper already own
    /// (spec.md §9, open question on failure-handler placement).
    #[serde(default)]
    pub jobs_in_progress: std::collections::BTreeSet<Namespec>,
}

impl ApplicationStatus {
    pub fn new(name: impl Into<String>, rules: ApplicationRules) -> Self {
        Self {
            name: name.into(),
            rules,
            processes: BTreeMap::new(),
            jobs_in_progress: Default::default(),
        }
    }

    /// True iff any contained process is conflicting.
    pub fn conflicting(&self) -> bool {
        self.processes.values().any(ProcessStatus::conflicting)
    }
}

/// A required process whose running entry was just invalidated, together
/// with the strategy its owning application wants applied (spec.md §4.1,
/// §9). Produced by the Context on peer-liveness loss; consumed by
/// whichever layer knows if this node is currently master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredProcessFailure {
    pub namespec: Namespec,
    pub application_name: String,
    pub strategy: RunningFailureStrategy,
}
