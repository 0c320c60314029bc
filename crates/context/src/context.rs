use std::collections::BTreeMap;
use std::sync::Arc;

use event_bus::{typeid, EventBus};
use supervisors_types::{
    AddressStatusPublished, ApplicationStatusPublished, AuthorizationEvent, LocalProcessInfo,
    Namespec, PeerAddress, PeerState, PeerStatus, ProcessEvent, ProcessStatusPublished,
    RequiredProcessFailure, Request, RulesSource, SupvisorsStatus, SupvisorsStatusPublished,
};

use crate::address_mapper::AddressMapper;
use crate::clock::{Clock, SystemClock};
use crate::error::ContextError;
use crate::process_model::ProcessModel;

/// A peer is declared dead if it hasn't ticked in this many seconds
/// (spec.md §4.1, §8 boundary properties).
pub const RUNNING_TIMEOUT_SECS: u64 = 10;

/// Knobs that change `Context`'s reaction to a peer going silent
/// (spec.md §4.1: "auto fencing").
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    /// When true, a peer that stops ticking is moved to `Isolating` (and
    /// later `Isolated`) instead of merely `Silent`.
    pub auto_fence: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { auto_fence: false }
    }
}

/// C4: aggregates the address mapper (C1), per-peer liveness (C2) and the
/// process/application model (C3); ingests inbound events and publishes
/// the resulting status snapshots on the (extracted) event bus.
pub struct Context<C: Clock = SystemClock> {
    mapper: AddressMapper,
    peers: BTreeMap<PeerAddress, PeerStatus>,
    processes: ProcessModel,
    options: ContextOptions,
    clock: C,
    event_bus: EventBus,
}

impl<C: Clock> Context<C> {
    pub fn new(
        mapper: AddressMapper,
        rules: Arc<dyn RulesSource>,
        options: ContextOptions,
        clock: C,
        event_bus: &EventBus,
    ) -> Result<Self, event_bus::Error> {
        let event_bus = event_bus.extract(
            &typeid![
                AddressStatusPublished,
                ProcessStatusPublished,
                ApplicationStatusPublished,
                SupvisorsStatusPublished
            ],
            &[],
        )?;

        let peers = mapper
            .peers()
            .iter()
            .map(|addr| (addr.clone(), PeerStatus::new(addr.clone())))
            .collect();

        Ok(Self {
            mapper,
            peers,
            processes: ProcessModel::new(rules),
            options,
            clock,
            event_bus,
        })
    }

    pub fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    pub fn processes(&self) -> &ProcessModel {
        &self.processes
    }

    pub fn processes_mut(&mut self) -> &mut ProcessModel {
        &mut self.processes
    }

    pub fn peer(&self, address: &PeerAddress) -> Option<&PeerStatus> {
        self.peers.get(address)
    }

    /// Every address currently `Running`, in ascending order (the election
    /// candidate list, spec.md §4.4: "the master is `min(running_addresses)`").
    pub fn running_addresses(&self) -> Vec<PeerAddress> {
        self.mapper
            .peers()
            .iter()
            .filter(|addr| {
                self.peers
                    .get(addr)
                    .is_some_and(|p| p.state == PeerState::Running)
            })
            .cloned()
            .collect()
    }

    fn ensure_known_and_not_isolated(&self, address: &PeerAddress) -> Result<(), ContextError> {
        match self.peers.get(address) {
            None => Err(ContextError::UnknownPeer(address.clone())),
            Some(peer) if peer.state.is_terminal() => {
                Err(ContextError::PeerIsolated(address.clone()))
            }
            _ => Ok(()),
        }
    }

    /// C2: a tick heartbeat arrives for `origin`. The first tick from a peer
    /// that isn't already `Running` moves it to `Checking` and enqueues a
    /// `check_address` request for the transport layer to act on; the
    /// reply arrives later as an authorization event (spec.md §4.1, §6,
    /// "port-knocking").
    pub async fn on_tick(
        &mut self,
        origin: PeerAddress,
        when: u64,
    ) -> Result<Option<Request>, ContextError> {
        self.ensure_known_and_not_isolated(&origin)?;

        let now = self.clock.now();
        let peer = self.peers.get_mut(&origin).expect("checked known above");
        let needs_check = matches!(peer.state, PeerState::Unknown | PeerState::Silent);

        peer.remote_time = when;
        peer.local_time = now;

        if needs_check {
            peer.state = PeerState::Checking;
        }

        self.publish_address_status(origin.clone()).await;

        Ok(needs_check.then_some(Request::CheckAddress(origin)))
    }

    /// The authorization reply for a peer previously moved to `Checking`
    /// (spec.md §4.1, glossary "port-knocking"). Neither party's own
    /// address is ever isolated by auto-fencing.
    pub async fn on_authorization(
        &mut self,
        event: AuthorizationEvent,
    ) -> Result<(), ContextError> {
        self.ensure_known_and_not_isolated(&event.origin)?;

        let is_self = self.mapper.is_self(&event.origin);
        let peer = self
            .peers
            .get_mut(&event.origin)
            .expect("checked known above");

        peer.state = if event.authorized {
            PeerState::Running
        } else if self.options.auto_fence && !is_self {
            PeerState::Isolating
        } else {
            PeerState::Silent
        };

        self.publish_address_status(event.origin).await;
        Ok(())
    }

    /// C3: an inbound process state change. Dropped silently (spec.md §4.2)
    /// if the process hasn't been loaded/created yet.
    pub async fn on_process_event(&mut self, event: ProcessEvent) -> Result<(), ContextError> {
        self.ensure_known_and_not_isolated(&event.origin)?;

        let application_name = event.application_name.clone();
        let Some(process) = self.processes.apply_event(&event).cloned() else {
            return Ok(());
        };

        self.publish_process_status(process).await;
        if let Some(application) = self.processes.application(&application_name).cloned() {
            self.publish_application_status(application).await;
        }

        Ok(())
    }

    /// Bulk-loads a peer's process inventory, typically right after its
    /// first successful authorization (spec.md §4.3).
    pub fn load_processes(
        &mut self,
        peer: &PeerAddress,
        infos: Vec<(String, Namespec, LocalProcessInfo)>,
    ) {
        self.processes.load_processes(peer, infos);
    }

    /// Periodic liveness sweep (spec.md §4.1, §8): every `Running` peer that
    /// hasn't ticked within [`RUNNING_TIMEOUT_SECS`] is demoted to `Silent`
    /// (or `Isolating`, under auto-fencing), and every process entry it
    /// hosted is invalidated. Returns the required-process failures the
    /// caller (who alone knows whether this node is master) should act on.
    pub async fn on_timer(&mut self) -> Vec<RequiredProcessFailure> {
        let now = self.clock.now();

        let expired: Vec<PeerAddress> = self
            .peers
            .values()
            .filter(|peer| {
                peer.state == PeerState::Running
                    && now.saturating_sub(peer.local_time) > RUNNING_TIMEOUT_SECS
            })
            .map(|peer| peer.address.clone())
            .collect();

        let mut failures = Vec::new();

        for address in expired {
            self.demote_peer(&address).await;

            for (namespec, strategy) in self.processes.invalidate_peer(&address) {
                let application_name = self
                    .processes
                    .all_process_states()
                    .find(|(n, _)| **n == namespec)
                    .map(|(_, process)| process.application_name.clone())
                    .unwrap_or_default();

                failures.push(RequiredProcessFailure {
                    namespec,
                    application_name,
                    strategy,
                });
            }
        }

        failures
    }

    /// Moves a peer out of `Running` into `Silent`/`Isolating`, and
    /// publishes the new status. Does not touch the process model; callers
    /// that need invalidation call [`ProcessModel::invalidate_peer`] too.
    async fn demote_peer(&mut self, address: &PeerAddress) {
        let is_self = self.mapper.is_self(address);
        if let Some(peer) = self.peers.get_mut(address) {
            peer.state = if self.options.auto_fence && !is_self {
                PeerState::Isolating
            } else {
                PeerState::Silent
            };
        }
        self.publish_address_status(address.clone()).await;
    }

    /// Promotes every `Isolating` peer to the terminal `Isolated` state
    /// (spec.md §4.1). Returns the newly isolated addresses.
    pub async fn handle_isolation(&mut self) -> Vec<PeerAddress> {
        let isolating: Vec<PeerAddress> = self
            .peers
            .values()
            .filter(|peer| peer.state == PeerState::Isolating)
            .map(|peer| peer.address.clone())
            .collect();

        for address in &isolating {
            if let Some(peer) = self.peers.get_mut(address) {
                peer.state = PeerState::Isolated;
            }
            self.publish_address_status(address.clone()).await;
        }

        isolating
    }

    /// Resets every non-isolated peer back to `Unknown` (spec.md §4.4, on
    /// entering `Initialization`).
    pub async fn reset_non_isolated_peers(&mut self) {
        let addresses: Vec<PeerAddress> = self
            .peers
            .values()
            .filter(|peer| !peer.state.is_terminal())
            .map(|peer| peer.address.clone())
            .collect();

        for address in addresses {
            if let Some(peer) = self.peers.get_mut(&address) {
                peer.state = PeerState::Unknown;
            }
            self.publish_address_status(address).await;
        }
    }

    /// Forces every still-`Unknown` peer to `Silent`/`Isolating` (spec.md
    /// §4.4, on leaving `Initialization`: peers that never answered the
    /// first tick are declared dead rather than left pending forever).
    pub async fn force_unresponsive_peers(&mut self) {
        let unknown: Vec<PeerAddress> = self
            .peers
            .values()
            .filter(|peer| peer.state == PeerState::Unknown)
            .map(|peer| peer.address.clone())
            .collect();

        for address in unknown {
            self.demote_peer(&address).await;
        }
    }

    pub async fn publish_cluster_status(&self, status: SupvisorsStatus) {
        self.event_bus.send(SupvisorsStatusPublished(status)).await;
    }

    async fn publish_address_status(&self, address: PeerAddress) {
        if let Some(peer) = self.peers.get(&address) {
            self.event_bus
                .send(AddressStatusPublished(peer.clone()))
                .await;
        }
    }

    async fn publish_process_status(&self, process: supervisors_types::ProcessStatus) {
        self.event_bus.send(ProcessStatusPublished(process)).await;
    }

    async fn publish_application_status(&self, application: supervisors_types::ApplicationStatus) {
        self.event_bus
            .send(ApplicationStatusPublished(application))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisors_types::{NoRules, ProcessState};

    fn addrs(names: &[&str]) -> Vec<PeerAddress> {
        names.iter().map(|n| PeerAddress::new(*n)).collect()
    }

    async fn fixture() -> (Context<crate::clock::TestClock>, event_bus::EventBus) {
        let mut bus = EventBus::default();
        bus.register::<AddressStatusPublished>(None);
        bus.register::<ProcessStatusPublished>(None);
        bus.register::<ApplicationStatusPublished>(None);
        bus.register::<SupvisorsStatusPublished>(None);

        let mapper = AddressMapper::new(addrs(&["a", "b", "c"]), PeerAddress::new("a")).unwrap();
        let context = Context::new(
            mapper,
            Arc::new(NoRules),
            ContextOptions::default(),
            crate::clock::TestClock::new(0),
            &bus,
        )
        .unwrap();

        (context, bus)
    }

    #[tokio::test]
    async fn unknown_peer_ticks_move_to_checking() {
        let (mut context, _bus) = fixture().await;
        let request = context.on_tick(PeerAddress::new("b"), 1).await.unwrap();

        let peer = context.peer(&PeerAddress::new("b")).unwrap();
        assert_eq!(peer.state, PeerState::Checking);
        assert_eq!(peer.remote_time, 1);
        assert_eq!(request, Some(Request::CheckAddress(PeerAddress::new("b"))));
    }

    #[tokio::test]
    async fn a_second_tick_while_checking_does_not_re_enqueue_check_address() {
        let (mut context, _bus) = fixture().await;
        context.on_tick(PeerAddress::new("b"), 1).await.unwrap();

        let request = context.on_tick(PeerAddress::new("b"), 2).await.unwrap();
        assert_eq!(request, None);
    }

    #[tokio::test]
    async fn tick_from_address_outside_the_list_is_rejected() {
        let (mut context, _bus) = fixture().await;
        let err = context
            .on_tick(PeerAddress::new("z"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn authorization_promotes_checking_peer_to_running() {
        let (mut context, _bus) = fixture().await;
        context.on_tick(PeerAddress::new("b"), 1).await.unwrap();
        context
            .on_authorization(AuthorizationEvent {
                origin: PeerAddress::new("b"),
                authorized: true,
            })
            .await
            .unwrap();

        assert_eq!(
            context.peer(&PeerAddress::new("b")).unwrap().state,
            PeerState::Running
        );
        assert_eq!(context.running_addresses(), vec![PeerAddress::new("b")]);
    }

    #[tokio::test]
    async fn refused_authorization_without_auto_fence_goes_silent() {
        let (mut context, _bus) = fixture().await;
        context.on_tick(PeerAddress::new("b"), 1).await.unwrap();
        context
            .on_authorization(AuthorizationEvent {
                origin: PeerAddress::new("b"),
                authorized: false,
            })
            .await
            .unwrap();

        assert_eq!(
            context.peer(&PeerAddress::new("b")).unwrap().state,
            PeerState::Silent
        );
    }

    #[tokio::test]
    async fn timer_expires_running_peer_at_boundary() {
        let (mut context, _bus) = fixture().await;
        context.on_tick(PeerAddress::new("b"), 1).await.unwrap();
        context
            .on_authorization(AuthorizationEvent {
                origin: PeerAddress::new("b"),
                authorized: true,
            })
            .await
            .unwrap();

        context.clock.set(RUNNING_TIMEOUT_SECS);
        assert!(context.on_timer().await.is_empty());
        assert_eq!(
            context.peer(&PeerAddress::new("b")).unwrap().state,
            PeerState::Running
        );

        context.clock.set(RUNNING_TIMEOUT_SECS + 1);
        context.on_timer().await;
        assert_eq!(
            context.peer(&PeerAddress::new("b")).unwrap().state,
            PeerState::Silent
        );
    }

    #[tokio::test]
    async fn timer_invalidates_running_process_entries_and_reports_failure() {
        let (mut context, _bus) = fixture().await;
        context.on_tick(PeerAddress::new("b"), 1).await.unwrap();
        context
            .on_authorization(AuthorizationEvent {
                origin: PeerAddress::new("b"),
                authorized: true,
            })
            .await
            .unwrap();

        let namespec = Namespec::new("app", "worker");
        context.load_processes(
            &PeerAddress::new("b"),
            vec![(
                "app".into(),
                namespec.clone(),
                LocalProcessInfo::new(ProcessState::Running),
            )],
        );

        context.clock.set(RUNNING_TIMEOUT_SECS + 1);
        let failures = context.on_timer().await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].namespec, namespec);
        assert_eq!(failures[0].application_name, "app");
    }

    #[tokio::test]
    async fn isolated_peer_is_rejected_for_further_ingestion() {
        let mut bus = EventBus::default();
        bus.register::<AddressStatusPublished>(None);
        bus.register::<ProcessStatusPublished>(None);
        bus.register::<ApplicationStatusPublished>(None);
        bus.register::<SupvisorsStatusPublished>(None);

        let mapper = AddressMapper::new(addrs(&["a", "b"]), PeerAddress::new("a")).unwrap();
        let mut context = Context::new(
            mapper,
            Arc::new(NoRules),
            ContextOptions { auto_fence: true },
            crate::clock::TestClock::new(0),
            &bus,
        )
        .unwrap();

        context.on_tick(PeerAddress::new("b"), 1).await.unwrap();
        context
            .on_authorization(AuthorizationEvent {
                origin: PeerAddress::new("b"),
                authorized: false,
            })
            .await
            .unwrap();
        assert_eq!(
            context.peer(&PeerAddress::new("b")).unwrap().state,
            PeerState::Isolating
        );

        context.handle_isolation().await;
        assert_eq!(
            context.peer(&PeerAddress::new("b")).unwrap().state,
            PeerState::Isolated
        );

        let err = context
            .on_tick(PeerAddress::new("b"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::PeerIsolated(_)));
    }
}
