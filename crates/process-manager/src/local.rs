use std::sync::Arc;

use async_trait::async_trait;
use supervisors_types::Namespec;

use crate::{PeerManagerInfo, ProcessManager, ProcessManagerError, ProcessSnapshot};

/// The in-process interface to this node's own local process manager
/// (e.g. the supervisord instance co-located with this node). Spec.md §1:
/// "the core does not launch OS processes itself" — this is the seam
/// where that external collaborator is plugged in.
#[async_trait]
pub trait LocalBackend: Send + Sync {
    async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, String>;
    async fn start_process(&self, namespec: &Namespec, extra_args: &str) -> Result<(), String>;
    async fn stop_process(&self, namespec: &Namespec) -> Result<(), String>;
    async fn restart(&self) -> Result<(), String>;
    async fn shutdown(&self) -> Result<(), String>;
    async fn peer_info(&self) -> Result<PeerManagerInfo, String>;
}

/// Calls the local process manager directly, with no serialization
/// (spec.md §4.7: the local fast-path taken when the dispatch target is
/// this node's own address).
pub struct LocalProcessManager {
    backend: Arc<dyn LocalBackend>,
}

impl LocalProcessManager {
    pub fn new(backend: Arc<dyn LocalBackend>) -> Self {
        Self { backend }
    }
}

fn self_namespec() -> Namespec {
    Namespec::new("supervisors", "self")
}

#[async_trait]
impl ProcessManager for LocalProcessManager {
    async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, ProcessManagerError> {
        self.backend
            .list_processes()
            .await
            .map_err(|message| ProcessManagerError::Remote {
                namespec: self_namespec(),
                message,
            })
    }

    async fn start_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError> {
        self.start_process_with_extra_args(namespec, "").await
    }

    async fn start_process_with_extra_args(
        &self,
        namespec: &Namespec,
        extra_args: &str,
    ) -> Result<(), ProcessManagerError> {
        self.backend
            .start_process(namespec, extra_args)
            .await
            .map_err(|message| ProcessManagerError::Remote {
                namespec: namespec.clone(),
                message,
            })
    }

    async fn stop_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError> {
        self.backend
            .stop_process(namespec)
            .await
            .map_err(|message| ProcessManagerError::Remote {
                namespec: namespec.clone(),
                message,
            })
    }

    async fn restart(&self) -> Result<(), ProcessManagerError> {
        self.backend
            .restart()
            .await
            .map_err(|message| ProcessManagerError::Remote {
                namespec: self_namespec(),
                message,
            })
    }

    async fn shutdown(&self) -> Result<(), ProcessManagerError> {
        self.backend
            .shutdown()
            .await
            .map_err(|message| ProcessManagerError::Remote {
                namespec: self_namespec(),
                message,
            })
    }

    async fn peer_info(&self) -> Result<PeerManagerInfo, ProcessManagerError> {
        self.backend
            .peer_info()
            .await
            .map_err(|message| ProcessManagerError::Remote {
                namespec: self_namespec(),
                message,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingBackend {
        started: AtomicBool,
    }

    #[async_trait]
    impl LocalBackend for RecordingBackend {
        async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, String> {
            Ok(Vec::new())
        }
        async fn start_process(&self, _namespec: &Namespec, _extra_args: &str) -> Result<(), String> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop_process(&self, _namespec: &Namespec) -> Result<(), String> {
            Ok(())
        }
        async fn restart(&self) -> Result<(), String> {
            Ok(())
        }
        async fn shutdown(&self) -> Result<(), String> {
            Ok(())
        }
        async fn peer_info(&self) -> Result<PeerManagerInfo, String> {
            Ok(PeerManagerInfo {
                identifier: "test".into(),
                pid: 1,
            })
        }
    }

    #[tokio::test]
    async fn start_process_calls_through_to_the_backend() {
        let backend = Arc::new(RecordingBackend {
            started: AtomicBool::new(false),
        });
        let manager = LocalProcessManager::new(backend.clone());

        manager
            .start_process_with_extra_args(&Namespec::new("app", "worker"), "--flag")
            .await
            .unwrap();

        assert!(backend.started.load(Ordering::SeqCst));
    }
}
