use async_trait::async_trait;
use serde::Serialize;
use supervisors_types::Namespec;

use crate::{PeerManagerInfo, ProcessManager, ProcessManagerError, ProcessSnapshot};

/// Credentials for reaching a remote peer's process manager, read from
/// `SUPERVISOR_USERNAME`/`SUPERVISOR_PASSWORD` (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub username: String,
    pub password: String,
}

/// An HTTP JSON-RPC proxy to one remote peer's local process manager,
/// built with the configured host substituted for the target address
/// (spec.md §4.7, §4.9): posts JSON bodies to `{server_url}/process/{op}`
/// with HTTP basic auth.
pub struct RemoteProcessManager {
    client: reqwest::Client,
    server_url: String,
    credentials: RemoteCredentials,
}

#[derive(Serialize)]
struct StartProcessBody<'a> {
    namespec: &'a str,
    extra_args: &'a str,
}

#[derive(Serialize)]
struct NamespecBody<'a> {
    namespec: &'a str,
}

impl RemoteProcessManager {
    pub fn new(server_url: impl Into<String>, credentials: RemoteCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_url: server_url.into(),
            credentials,
        }
    }

    fn url(&self, op: &str) -> String {
        format!("{}/process/{op}", self.server_url)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        op: &str,
        body: &B,
    ) -> Result<(), ProcessManagerError> {
        self.client
            .post(self.url(op))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn get<R: serde::de::DeserializeOwned>(
        &self,
        op: &str,
    ) -> Result<R, ProcessManagerError> {
        let response = self
            .client
            .get(self.url(op))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProcessManager for RemoteProcessManager {
    async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, ProcessManagerError> {
        self.get("list").await
    }

    async fn start_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError> {
        self.start_process_with_extra_args(namespec, "").await
    }

    async fn start_process_with_extra_args(
        &self,
        namespec: &Namespec,
        extra_args: &str,
    ) -> Result<(), ProcessManagerError> {
        self.post(
            "start",
            &StartProcessBody {
                namespec: &namespec.to_string(),
                extra_args,
            },
        )
        .await
    }

    async fn stop_process(&self, namespec: &Namespec) -> Result<(), ProcessManagerError> {
        self.post(
            "stop",
            &NamespecBody {
                namespec: &namespec.to_string(),
            },
        )
        .await
    }

    async fn restart(&self) -> Result<(), ProcessManagerError> {
        self.post("restart", &()).await
    }

    async fn shutdown(&self) -> Result<(), ProcessManagerError> {
        self.post("shutdown", &()).await
    }

    async fn peer_info(&self) -> Result<PeerManagerInfo, ProcessManagerError> {
        self.get("info").await
    }
}
