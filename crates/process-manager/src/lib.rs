//! C11: the thin RPC client the Request Dispatcher (C8) uses to actually
//! reach a peer's local process manager, either in-process or over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use supervisors_types::{LocalProcessInfo, Namespec};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessManagerError {
    #[error("process manager request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("process manager returned an error for {namespec}: {message}")]
    Remote { namespec: Namespec, message: String },
}

/// One process as reported directly by a peer's own local process manager
/// (as opposed to [`supervisors_types::ProcessStatus`], which aggregates
/// across every peer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub namespec: Namespec,
    pub info: LocalProcessInfo,
}

/// Identifying metadata a peer's local process manager reports about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerManagerInfo {
    pub identifier: String,
    pub pid: u32,
}

/// A handle to a peer's local process manager (spec.md §4.7/§4.9),
/// mirroring `yuv_p2p::client::Handle`. Implemented once for the local
/// supervisord instance sharing this process, and once as an HTTP
/// JSON-RPC proxy for every other peer.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, ProcessManagerError>;
    async fn start_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError>;
    async fn start_process_with_extra_args(
        &self,
        namespec: &Namespec,
        extra_args: &str,
    ) -> Result<(), ProcessManagerError>;
    async fn stop_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError>;
    async fn restart(&self) -> Result<(), ProcessManagerError>;
    async fn shutdown(&self) -> Result<(), ProcessManagerError>;
    async fn peer_info(&self) -> Result<PeerManagerInfo, ProcessManagerError>;
}

#[cfg(any(test, feature = "mocks"))]
mockall::mock! {
    pub ProcessManager {}

    #[async_trait]
    impl ProcessManager for ProcessManager {
        async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, ProcessManagerError>;
        async fn start_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError>;
        async fn start_process_with_extra_args(
            &self,
            namespec: &Namespec,
            extra_args: &str,
        ) -> Result<(), ProcessManagerError>;
        async fn stop_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError>;
        async fn restart(&self) -> Result<(), ProcessManagerError>;
        async fn shutdown(&self) -> Result<(), ProcessManagerError>;
        async fn peer_info(&self) -> Result<PeerManagerInfo, ProcessManagerError>;
    }
}

mod local;
mod remote;

pub use local::{LocalBackend, LocalProcessManager};
pub use remote::{RemoteCredentials, RemoteProcessManager};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_satisfies_the_trait() {
        let mut mock = MockProcessManager::new();
        mock.expect_start_process().returning(|_| Ok(()));

        mock.start_process(&Namespec::new("app", "worker"))
            .await
            .unwrap();
    }
}
