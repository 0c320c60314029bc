use serde::Deserialize;
use supervisors_fsm::ConciliationStrategy;

/// FSM knobs (spec.md §6: `auto_fence`, `synchro_timeout`, `conciliation_strategy`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub auto_fence: bool,

    #[serde(default = "default_synchro_timeout")]
    pub synchro_timeout: u64,

    #[serde(default)]
    pub conciliation_strategy: ConciliationStrategy,
}

fn default_synchro_timeout() -> u64 {
    15
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            auto_fence: false,
            synchro_timeout: default_synchro_timeout(),
            conciliation_strategy: ConciliationStrategy::default(),
        }
    }
}
