//! Request Dispatcher (C8): consumes [`Request`]s produced by Context/FSM
//! and routes each to the process manager that can actually act on it —
//! the local fast-path for this node's own address, an HTTP proxy
//! (C11) for every other one (spec.md §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use supervisors_process_manager::{ProcessManager, ProcessManagerError};
use supervisors_types::{PeerAddress, Request};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no process manager registered for peer {0}")]
    UnknownPeer(PeerAddress),
    #[error(transparent)]
    ProcessManager(#[from] ProcessManagerError),
    #[error("request {0:?} does not target a process manager")]
    NotDispatchable(Request),
}

/// Routes [`Request`]s to the right [`ProcessManager`] by target address.
///
/// `CheckAddress`/`IsolateAddresses` requests are not process-manager
/// traffic (they belong to the transport layer) and are rejected with
/// [`DispatchError::NotDispatchable`].
pub struct RequestDispatcher {
    self_address: PeerAddress,
    managers: HashMap<PeerAddress, Arc<dyn ProcessManager>>,
}

impl RequestDispatcher {
    pub fn new(self_address: PeerAddress, local: Arc<dyn ProcessManager>) -> Self {
        let mut managers: HashMap<PeerAddress, Arc<dyn ProcessManager>> = HashMap::new();
        managers.insert(self_address.clone(), local);
        Self {
            self_address,
            managers,
        }
    }

    /// Registers the remote proxy to use for `address`. Overwrites any
    /// previous registration, which lets a peer be re-pointed after a
    /// configuration reload.
    pub fn register_remote(&mut self, address: PeerAddress, manager: Arc<dyn ProcessManager>) {
        if address == self.self_address {
            warn!(%address, "ignoring attempt to register a remote manager for self");
            return;
        }
        self.managers.insert(address, manager);
    }

    fn manager_for(&self, address: &PeerAddress) -> Result<&Arc<dyn ProcessManager>, DispatchError> {
        self.managers
            .get(address)
            .ok_or_else(|| DispatchError::UnknownPeer(address.clone()))
    }

    pub async fn dispatch(&self, request: Request) -> Result<(), DispatchError> {
        match request {
            Request::StartProcess {
                address,
                namespec,
                extra_args,
            } => {
                debug!(%address, %namespec, "dispatching start_process");
                self.manager_for(&address)?
                    .start_process_with_extra_args(&namespec, &extra_args)
                    .await?;
                Ok(())
            }
            Request::StopProcess { address, namespec } => {
                debug!(%address, %namespec, "dispatching stop_process");
                self.manager_for(&address)?.stop_process(&namespec).await?;
                Ok(())
            }
            Request::Restart(address) => {
                debug!(%address, "dispatching restart");
                self.manager_for(&address)?.restart().await?;
                Ok(())
            }
            Request::Shutdown(address) => {
                debug!(%address, "dispatching shutdown");
                self.manager_for(&address)?.shutdown().await?;
                Ok(())
            }
            other @ (Request::CheckAddress(_) | Request::IsolateAddresses(_)) => {
                Err(DispatchError::NotDispatchable(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisors_process_manager::MockProcessManager;
    use supervisors_types::Namespec;

    fn addr(s: &str) -> PeerAddress {
        PeerAddress::new(s)
    }

    #[tokio::test]
    async fn routes_start_process_to_the_local_manager_for_self_address() {
        let mut local = MockProcessManager::new();
        local
            .expect_start_process_with_extra_args()
            .withf(|namespec, extra_args| namespec.to_string() == "app:worker" && extra_args == "--x")
            .returning(|_, _| Ok(()));

        let dispatcher = RequestDispatcher::new(addr("node-a"), Arc::new(local));

        dispatcher
            .dispatch(Request::StartProcess {
                address: addr("node-a"),
                namespec: Namespec::new("app", "worker"),
                extra_args: "--x".into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn routes_shutdown_to_the_registered_remote_manager() {
        let local = MockProcessManager::new();
        let mut remote = MockProcessManager::new();
        remote.expect_shutdown().returning(|| Ok(()));

        let mut dispatcher = RequestDispatcher::new(addr("node-a"), Arc::new(local));
        dispatcher.register_remote(addr("node-b"), Arc::new(remote));

        dispatcher.dispatch(Request::Shutdown(addr("node-b"))).await.unwrap();
    }

    #[tokio::test]
    async fn unregistered_peer_is_rejected() {
        let local = MockProcessManager::new();
        let dispatcher = RequestDispatcher::new(addr("node-a"), Arc::new(local));

        let err = dispatcher
            .dispatch(Request::Restart(addr("node-z")))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::UnknownPeer(a) if a == addr("node-z")));
    }

    #[tokio::test]
    async fn check_address_is_not_dispatchable() {
        let local = MockProcessManager::new();
        let dispatcher = RequestDispatcher::new(addr("node-a"), Arc::new(local));

        let err = dispatcher
            .dispatch(Request::CheckAddress(addr("node-a")))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::NotDispatchable(_)));
    }
}
