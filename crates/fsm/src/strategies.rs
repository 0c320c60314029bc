use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use supervisors_types::ProcessStatus;

/// Named strategy passed to the Conciliator (spec.md §6, `conciliation_strategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConciliationStrategy {
    /// Stop every conflicting entry but the one on the lowest-ordered peer.
    #[default]
    Senicide,
    /// Stop every conflicting entry but the most recently started one.
    Infanticide,
    /// Stop every conflicting entry.
    StopAll,
    /// Only report the conflict; take no action.
    UserInaction,
}

/// C9: begins and tracks application start sequences during DEPLOYMENT.
/// Driven exclusively by the master's FSM.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn start_applications(&mut self);
    fn is_idle(&self) -> bool;
}

/// C9: begins and tracks application stop sequences during RESTARTING and
/// SHUTTING_DOWN (and aborted starts).
#[async_trait]
pub trait Stopper: Send + Sync {
    async fn stop_applications(&mut self);
    fn abort_starting(&mut self);
    fn is_idle(&self) -> bool;
}

/// C9: resolves a conflict set during CONCILIATION, according to the
/// configured [`ConciliationStrategy`]. Driven exclusively by the master's
/// FSM.
#[async_trait]
pub trait Conciliator: Send + Sync {
    async fn conciliate(&mut self, conflicts: Vec<ProcessStatus>, strategy: ConciliationStrategy);
}

/// No-op implementations used by tests and as a placeholder until a real
/// process-manager-backed strategy is wired in (spec.md §4.9, C11).
#[derive(Debug, Default)]
pub struct NoopDeployer;

#[async_trait]
impl Deployer for NoopDeployer {
    async fn start_applications(&mut self) {}
    fn is_idle(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct NoopStopper;

#[async_trait]
impl Stopper for NoopStopper {
    async fn stop_applications(&mut self) {}
    fn abort_starting(&mut self) {}
    fn is_idle(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct NoopConciliator;

#[async_trait]
impl Conciliator for NoopConciliator {
    async fn conciliate(&mut self, _conflicts: Vec<ProcessStatus>, _strategy: ConciliationStrategy) {}
}
