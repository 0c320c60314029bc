use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_bus::EventBus;
use eyre::{Context as _, Result};
use supervisors_context::{AddressMapper, Clock, Context, ContextOptions, SystemClock};
use supervisors_dispatcher::RequestDispatcher;
use supervisors_fsm::{ClusterFsm, NoopConciliator, NoopDeployer, NoopStopper};
use supervisors_process_manager::{
    LocalBackend, LocalProcessManager, PeerManagerInfo, ProcessManager, ProcessSnapshot,
    RemoteCredentials, RemoteProcessManager,
};
use supervisors_rules::FileRules;
use supervisors_transport::{
    check_address, request_channel, subscribe_to_peer, ExternalPublisher, InternalPublisher,
    RequestReceiver, RequestSender,
};
use supervisors_types::{
    AddressStatusPublished, ApplicationStatusPublished, AuthorizationEvent, ExternalEvent,
    ExternalHeader, InternalEvent, Namespec, NoRules, PeerAddress, ProcessStatusPublished,
    Request, RulesSource, SupvisorsStatusPublished, TickEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Per-peer subscriber cancellation, keyed by the peer it disconnects
/// (spec.md §4.5: "subscribers disconnect from a peer the moment the
/// Context reports it as newly isolated").
type PeerTokens = HashMap<PeerAddress, CancellationToken>;

use crate::config::NodeConfig;

const DEFAULT_CHANNEL_SIZE: usize = 1000;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const TIMER_PERIOD: Duration = Duration::from_secs(5);

/// Stands in for the real local supervisord process manager (spec.md §1:
/// "the core does not launch OS processes itself"). Logs every call it
/// would otherwise forward; a deployment wires a real [`LocalBackend`]
/// in its place.
struct NoopLocalBackend;

#[async_trait]
impl LocalBackend for NoopLocalBackend {
    async fn list_processes(&self) -> Result<Vec<ProcessSnapshot>, String> {
        Ok(Vec::new())
    }

    async fn start_process(&self, namespec: &Namespec, extra_args: &str) -> Result<(), String> {
        info!(%namespec, extra_args, "would start process");
        Ok(())
    }

    async fn stop_process(&self, namespec: &Namespec) -> Result<(), String> {
        info!(%namespec, "would stop process");
        Ok(())
    }

    async fn restart(&self) -> Result<(), String> {
        info!("would restart local supervisor");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), String> {
        info!("would shut down local supervisor");
        Ok(())
    }

    async fn peer_info(&self) -> Result<PeerManagerInfo, String> {
        Ok(PeerManagerInfo {
            identifier: "supervisors".into(),
            pid: std::process::id(),
        })
    }
}

fn internal_addr(address: &PeerAddress, port: u16) -> Result<SocketAddr> {
    format!("{}:{port}", address.as_str())
        .parse()
        .wrap_err_with(|| format!("peer address {address} is not a valid host:port pair"))
}

/// Substitutes `target`'s host into `server_url`, keeping its scheme and
/// port (spec.md §4.7: "construct a proxy ... with the host substituted
/// for the target address").
fn proxy_url(server_url: &str, target: &PeerAddress) -> Result<String> {
    let mut url = reqwest::Url::parse(server_url).wrap_err("SUPERVISOR_SERVER_URL is not a URL")?;
    if url.scheme() != "http" {
        eyre::bail!("SUPERVISOR_SERVER_URL must be an http:// URL, got {server_url}");
    }
    url.set_host(Some(target.as_str()))
        .wrap_err_with(|| format!("cannot substitute host for peer {target}"))?;
    Ok(url.to_string())
}

/// Orchestrates the whole node: the control task (owns `Context`/`ClusterFsm`),
/// the I/O tasks (internal/external bus, request dispatch), and the shared
/// cancellation/task-tracking that ties them together (spec.md §5).
pub struct Node {
    config: NodeConfig,
    mapper: AddressMapper,
    rules: Arc<dyn RulesSource>,
    event_bus: EventBus,
    cancellation: CancellationToken,
    pub(crate) task_tracker: TaskTracker,
}

impl Node {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let mapper = AddressMapper::new(
            config.addresses.address_list.clone(),
            config.addresses.self_address.clone(),
        )
        .wrap_err("self address is not a member of address_list")?;

        let rules: Arc<dyn RulesSource> = match &config.rules.rules_file {
            Some(path) => Arc::new(
                FileRules::from_path(path)
                    .wrap_err_with(|| format!("failed to load rules file {path:?}"))?,
            ),
            None => Arc::new(NoRules),
        };

        let event_bus = Self::init_event_bus();

        Ok(Self {
            config,
            mapper,
            rules,
            event_bus,
            cancellation: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        })
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    fn init_event_bus() -> EventBus {
        let mut event_bus = EventBus::default();
        event_bus.register::<AddressStatusPublished>(Some(DEFAULT_CHANNEL_SIZE));
        event_bus.register::<ProcessStatusPublished>(Some(DEFAULT_CHANNEL_SIZE));
        event_bus.register::<ApplicationStatusPublished>(Some(DEFAULT_CHANNEL_SIZE));
        event_bus.register::<SupvisorsStatusPublished>(Some(DEFAULT_CHANNEL_SIZE));
        event_bus
    }

    fn build_dispatcher(&self) -> RequestDispatcher {
        let self_address = self.mapper.self_address().clone();
        let local: Arc<dyn ProcessManager> =
            Arc::new(LocalProcessManager::new(Arc::new(NoopLocalBackend)));
        let mut dispatcher = RequestDispatcher::new(self_address.clone(), local);

        let server_url = std::env::var("SUPERVISOR_SERVER_URL").ok();
        let username = std::env::var("SUPERVISOR_USERNAME").unwrap_or_default();
        let password = std::env::var("SUPERVISOR_PASSWORD").unwrap_or_default();

        if let Some(server_url) = server_url {
            for peer in self.mapper.peers() {
                if *peer == self_address {
                    continue;
                }

                match proxy_url(&server_url, peer) {
                    Ok(url) => {
                        let remote: Arc<dyn ProcessManager> = Arc::new(RemoteProcessManager::new(
                            url,
                            RemoteCredentials {
                                username: username.clone(),
                                password: password.clone(),
                            },
                        ));
                        dispatcher.register_remote(peer.clone(), remote);
                    }
                    Err(err) => warn!(%peer, %err, "not registering a remote process manager"),
                }
            }
        } else {
            warn!("SUPERVISOR_SERVER_URL not set, remote peers are unreachable through the dispatcher");
        }

        dispatcher
    }

    /// Wires and spawns every long-lived task. Mirrors the teacher's
    /// `Node::run`: order matters only in that everything must be up
    /// before the control task starts consuming from them.
    pub async fn run(&self) -> Result<()> {
        let (internal_publisher, _accept_handle) = InternalPublisher::bind(
            internal_addr(self.mapper.self_address(), self.config.transport.internal_port)?,
            self.cancellation.clone(),
        )
        .await
        .wrap_err("failed to bind the internal publisher")?;

        let (external_publisher, _external_accept_handle) =
            ExternalPublisher::bind(self.config.transport.event_port, self.cancellation.clone())
                .await
                .wrap_err("failed to bind the external publisher")?;

        let (control_tx, control_rx) = mpsc::channel::<InternalEvent>(DEFAULT_CHANNEL_SIZE);

        let mut peer_tokens: PeerTokens = HashMap::new();
        for peer in self.mapper.peers() {
            let addr = internal_addr(peer, self.config.transport.internal_port)?;
            let out = control_tx.clone();
            let token = self.cancellation.child_token();
            peer_tokens.insert(peer.clone(), token.clone());
            self.task_tracker.spawn(subscribe_to_peer(addr, out, token));
        }

        let (request_tx, request_rx) = request_channel();

        self.spawn_external_forwarder(external_publisher);
        self.spawn_dispatcher(request_rx, control_tx.clone(), peer_tokens.clone());
        self.spawn_control_task(control_rx, internal_publisher, request_tx, peer_tokens);

        self.task_tracker.close();

        Ok(())
    }

    fn spawn_external_forwarder(&self, publisher: ExternalPublisher) {
        let address_rx = self.event_bus.subscribe::<AddressStatusPublished>();
        let process_rx = self.event_bus.subscribe::<ProcessStatusPublished>();
        let application_rx = self.event_bus.subscribe::<ApplicationStatusPublished>();
        let status_rx = self.event_bus.subscribe::<SupvisorsStatusPublished>();
        let cancellation = self.cancellation.clone();

        self.task_tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    event = address_rx.recv() => {
                        let Ok(AddressStatusPublished(status)) = event else { return };
                        publisher.publish(ExternalEvent {
                            header: ExternalHeader::AddressStatus,
                            body: serde_json::to_value(status).unwrap_or_default(),
                        });
                    }
                    event = process_rx.recv() => {
                        let Ok(ProcessStatusPublished(status)) = event else { return };
                        publisher.publish(ExternalEvent {
                            header: ExternalHeader::ProcessStatus,
                            body: serde_json::to_value(status).unwrap_or_default(),
                        });
                    }
                    event = application_rx.recv() => {
                        let Ok(ApplicationStatusPublished(status)) = event else { return };
                        publisher.publish(ExternalEvent {
                            header: ExternalHeader::ApplicationStatus,
                            body: serde_json::to_value(status).unwrap_or_default(),
                        });
                    }
                    event = status_rx.recv() => {
                        let Ok(SupvisorsStatusPublished(status)) = event else { return };
                        publisher.publish(ExternalEvent {
                            header: ExternalHeader::SupvisorsStatus,
                            body: serde_json::to_value(status).unwrap_or_default(),
                        });
                    }
                }
            }
        });
    }

    /// Drains the request channel. `CheckAddress`/`IsolateAddresses` are
    /// transport/I-O concerns (spec.md §4.5, §4.6) and are handled here
    /// directly instead of being handed to the process-manager dispatcher;
    /// everything else goes to [`RequestDispatcher`].
    fn spawn_dispatcher(
        &self,
        mut requests: RequestReceiver,
        inbound: mpsc::Sender<InternalEvent>,
        peer_tokens: PeerTokens,
    ) {
        let dispatcher = self.build_dispatcher();
        let cancellation = self.cancellation.clone();
        let internal_port = self.config.transport.internal_port;

        self.task_tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    request = requests.recv() => {
                        let Some(request) = request else { return };
                        match request {
                            Request::CheckAddress(address) => {
                                Self::run_check_address(address, internal_port, &inbound).await;
                            }
                            Request::IsolateAddresses(addresses) => {
                                Self::disconnect_peers(&addresses, &peer_tokens);
                            }
                            other => {
                                if let Err(err) = dispatcher.dispatch(other).await {
                                    warn!(%err, "request dispatch failed");
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Port-knocks `address` and delivers the resulting authorization back
    /// onto the control task's inbound channel (spec.md §4.1: "the remote
    /// peer replies over the authorization channel").
    async fn run_check_address(
        address: PeerAddress,
        internal_port: u16,
        inbound: &mpsc::Sender<InternalEvent>,
    ) {
        let authorized = match internal_addr(&address, internal_port) {
            Ok(socket_addr) => check_address(socket_addr).await,
            Err(err) => {
                warn!(%address, %err, "cannot resolve peer address to check");
                false
            }
        };

        let event = InternalEvent::Authorization(AuthorizationEvent {
            origin: address.clone(),
            authorized,
        });

        if inbound.send(event).await.is_err() {
            warn!(%address, "control channel closed, dropping authorization reply");
        }
    }

    fn disconnect_peers(addresses: &[PeerAddress], peer_tokens: &PeerTokens) {
        for address in addresses {
            match peer_tokens.get(address) {
                Some(token) => {
                    debug!(%address, "disconnecting subscriber for isolated peer");
                    token.cancel();
                }
                None => warn!(%address, "no subscriber registered for isolated peer"),
            }
        }
    }

    fn spawn_control_task(
        &self,
        mut inbound: mpsc::Receiver<InternalEvent>,
        internal_publisher: InternalPublisher,
        requests: RequestSender,
        peer_tokens: PeerTokens,
    ) {
        let mapper = self.mapper.clone();
        let rules = self.rules.clone();
        let options = ContextOptions {
            auto_fence: self.config.cluster.auto_fence,
        };
        let synchro_timeout = self.config.cluster.synchro_timeout;
        let conciliation_strategy = self.config.cluster.conciliation_strategy;
        let event_bus = self.event_bus.clone();
        let cancellation = self.cancellation.clone();

        self.task_tracker.spawn(async move {
            let self_address = mapper.self_address().clone();

            let mut context = match Context::new(mapper, rules, options, SystemClock, &event_bus) {
                Ok(context) => context,
                Err(err) => {
                    error!(%err, "failed to build context, control task exiting");
                    return;
                }
            };

            let mut fsm = ClusterFsm::new(
                synchro_timeout,
                conciliation_strategy,
                NoopDeployer,
                NoopStopper,
                NoopConciliator,
            );

            let now = SystemClock.now();
            fsm.start(&mut context, now).await;

            let mut timer = tokio::time::interval(TIMER_PERIOD);

            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    event = inbound.recv() => {
                        let Some(event) = event else { return };
                        if !Self::ingest(&mut context, event, &requests).await {
                            return;
                        }
                    }
                    _ = timer.tick() => {
                        let now = SystemClock.now();

                        internal_publisher.publish(InternalEvent::Tick(TickEvent {
                            origin: self_address.clone(),
                            when: now,
                        }));

                        let failures = context.on_timer().await;
                        for failure in failures {
                            debug!(?failure, "required process failure");
                        }

                        let isolated = context.handle_isolation().await;
                        Self::disconnect_peers(&isolated, &peer_tokens);

                        for request in fsm.advance(&mut context, now).await {
                            if requests.send(request).await.is_err() {
                                warn!("request channel closed, control task exiting");
                                return;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Ingests one inbound event. Returns `false` if the request channel has
    /// closed and the control task should exit, `true` otherwise.
    async fn ingest<C: supervisors_context::Clock>(
        context: &mut Context<C>,
        event: InternalEvent,
        requests: &RequestSender,
    ) -> bool {
        match event {
            InternalEvent::Tick(tick) => match context.on_tick(tick.origin, tick.when).await {
                Ok(Some(request)) => {
                    if requests.send(request).await.is_err() {
                        warn!("request channel closed, control task exiting");
                        return false;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "dropping malformed or rejected inbound event"),
            },
            InternalEvent::Authorization(auth) => {
                if let Err(err) = context.on_authorization(auth).await {
                    warn!(%err, "dropping malformed or rejected inbound event");
                }
            }
            InternalEvent::Process(process) => {
                if let Err(err) = context.on_process_event(process).await {
                    warn!(%err, "dropping malformed or rejected inbound event");
                }
            }
            InternalEvent::Statistics(_) => {}
        }

        true
    }

    pub async fn shutdown(&self) {
        info!("shutting down, finishing in-flight work...");
        self.cancellation.cancel();

        let timeout = self
            .config
            .shutdown_timeout
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        tokio::select! {
            _ = self.task_tracker.wait() => {},
            _ = tokio::time::sleep(Duration::from_secs(timeout)) => {
                info!("shutdown timeout reached, exiting anyway");
            },
        }
    }
}
