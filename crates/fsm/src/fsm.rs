use supervisors_context::{Clock, Context};
use supervisors_types::{ClusterState, PeerAddress, PeerState, Request, SupvisorsStatus};
use tracing::{debug, info};

use crate::strategies::{Conciliator, ConciliationStrategy, Deployer, Stopper};

/// Bounds `advance`'s hop loop; `ClusterState` has 7 variants and a single
/// event can legally visit each at most once, so this is generous headroom
/// rather than a tight budget.
const MAX_ADVANCE_HOPS: usize = 16;

/// C7: the global cluster state machine. Generic over the C9 strategy
/// implementations so tests can swap in no-ops or spies.
pub struct ClusterFsm<D: Deployer, S: Stopper, Con: Conciliator> {
    state: ClusterState,
    master_address: Option<PeerAddress>,
    start_date: u64,
    synchro_timeout: u64,
    conciliation_strategy: ConciliationStrategy,
    deployer: D,
    stopper: S,
    conciliator: Con,
}

impl<D: Deployer, S: Stopper, Con: Conciliator> ClusterFsm<D, S, Con> {
    pub fn new(
        synchro_timeout: u64,
        conciliation_strategy: ConciliationStrategy,
        deployer: D,
        stopper: S,
        conciliator: Con,
    ) -> Self {
        Self {
            state: ClusterState::Initialization,
            master_address: None,
            start_date: 0,
            synchro_timeout,
            conciliation_strategy,
            deployer,
            stopper,
            conciliator,
        }
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn master_address(&self) -> Option<&PeerAddress> {
        self.master_address.as_ref()
    }

    pub fn status(&self) -> SupvisorsStatus {
        SupvisorsStatus {
            state: self.state,
            master_address: self.master_address.clone(),
        }
    }

    pub fn is_master(&self, self_address: &PeerAddress) -> bool {
        self.master_address.as_deref() == Some(self_address)
    }

    /// Starts the FSM at `now` (spec.md §4.4, INITIALIZATION on enter).
    pub async fn start<C: Clock>(&mut self, context: &mut Context<C>, now: u64) {
        self.start_date = now;
        context.reset_non_isolated_peers().await;
        context.publish_cluster_status(self.status()).await;
    }

    /// Re-invokes the "on next" guard as long as it reports a legal
    /// transition, so a multi-hop move (e.g. `Initialization` straight
    /// through `Deployment` into `Operation`) settles within one event
    /// instead of needing one timer tick per hop (spec.md §4.4). Returns
    /// every request accumulated across all hops.
    pub async fn advance<C: Clock>(&mut self, context: &mut Context<C>, now: u64) -> Vec<Request> {
        let mut requests = Vec::new();

        for _ in 0..MAX_ADVANCE_HOPS {
            let before = self.state;
            requests.extend(self.advance_once(context, now).await);
            if self.state == before {
                return requests;
            }
        }

        debug!(state = ?self.state, "advance hit the hop limit without settling");
        requests
    }

    /// Evaluates the "on next" guard for the current state and transitions
    /// at most once. Returns any requests the caller must broadcast.
    async fn advance_once<C: Clock>(&mut self, context: &mut Context<C>, now: u64) -> Vec<Request> {
        match self.state {
            ClusterState::Initialization => self.advance_initialization(context, now).await,
            ClusterState::Deployment => self.advance_deployment(context).await,
            ClusterState::Operation => self.advance_operation(context, now).await,
            ClusterState::Conciliation => self.advance_conciliation(context, now).await,
            ClusterState::Restarting | ClusterState::ShuttingDown => {
                self.advance_stopping(context).await
            }
            ClusterState::Shutdown => Vec::new(),
        }
    }

    /// Requests a cluster-wide restart (spec.md §4.4, §6 `on_restart`).
    pub async fn request_restart<C: Clock>(&mut self, context: &mut Context<C>) {
        self.enter_stopping(context, ClusterState::Restarting).await;
    }

    /// Requests a cluster-wide shutdown (spec.md §4.4, §6 `on_shutdown`).
    pub async fn request_shutdown<C: Clock>(&mut self, context: &mut Context<C>) {
        self.enter_stopping(context, ClusterState::ShuttingDown).await;
    }

    async fn advance_initialization<C: Clock>(
        &mut self,
        context: &mut Context<C>,
        now: u64,
    ) -> Vec<Request> {
        let self_running = context
            .peer(context.mapper().self_address())
            .is_some_and(|p| p.state == PeerState::Running);
        let all_left_unknown = context
            .mapper()
            .peers()
            .iter()
            .all(|addr| context.peer(addr).is_some_and(|p| p.state != PeerState::Unknown));
        let timed_out = now.saturating_sub(self.start_date) > self.synchro_timeout;

        if (self_running && all_left_unknown) || timed_out {
            context.force_unresponsive_peers().await;
            self.master_address = context.running_addresses().into_iter().min();
            info!(master = ?self.master_address, "elected master, entering deployment");
            self.transition(context, ClusterState::Deployment).await;

            if self.is_master_of(context) {
                self.deployer.start_applications().await;
            }
        }

        Vec::new()
    }

    async fn advance_deployment<C: Clock>(&mut self, context: &mut Context<C>) -> Vec<Request> {
        if !self.is_master_of(context) || self.deployer.is_idle() {
            let next = if context.processes().conflicting() {
                ClusterState::Conciliation
            } else {
                ClusterState::Operation
            };
            self.enter_operation_family(context, next).await;
        }

        Vec::new()
    }

    async fn advance_operation<C: Clock>(
        &mut self,
        context: &mut Context<C>,
        now: u64,
    ) -> Vec<Request> {
        if self.deployer.is_idle() && self.stopper.is_idle() && !self.liveness_ok(context) {
            self.master_address = None;
            self.transition(context, ClusterState::Initialization).await;
            self.start(context, now).await;
        } else if context.processes().conflicting() {
            self.enter_operation_family(context, ClusterState::Conciliation).await;
        }

        Vec::new()
    }

    async fn advance_conciliation<C: Clock>(
        &mut self,
        context: &mut Context<C>,
        now: u64,
    ) -> Vec<Request> {
        if self.deployer.is_idle() && self.stopper.is_idle() && !self.liveness_ok(context) {
            self.master_address = None;
            self.transition(context, ClusterState::Initialization).await;
            self.start(context, now).await;
        } else if !context.processes().conflicting() {
            self.enter_operation_family(context, ClusterState::Operation).await;
        }

        Vec::new()
    }

    async fn advance_stopping<C: Clock>(&mut self, context: &mut Context<C>) -> Vec<Request> {
        if !self.stopper.is_idle() {
            return Vec::new();
        }

        let exiting = self.state;
        self.transition(context, ClusterState::Shutdown).await;

        let build_request: fn(PeerAddress) -> Request = match exiting {
            ClusterState::Restarting => Request::Restart,
            ClusterState::ShuttingDown => Request::Shutdown,
            _ => unreachable!("advance_stopping only runs from Restarting/ShuttingDown"),
        };

        self.broadcast_self_last(context, build_request)
    }

    async fn enter_stopping<C: Clock>(&mut self, context: &mut Context<C>, target: ClusterState) {
        self.deployer.is_idle(); // starts, if any, are abandoned below
        self.stopper.abort_starting();
        self.transition(context, target).await;
        self.stopper.stop_applications().await;
    }

    async fn enter_operation_family<C: Clock>(
        &mut self,
        context: &mut Context<C>,
        target: ClusterState,
    ) {
        self.transition(context, target).await;

        if target == ClusterState::Conciliation && self.is_master_of(context) {
            let conflicts: Vec<_> = context
                .processes()
                .conflicts()
                .into_iter()
                .cloned()
                .collect();
            self.conciliator
                .conciliate(conflicts, self.conciliation_strategy)
                .await;
        }
    }

    async fn transition<C: Clock>(&mut self, context: &mut Context<C>, next: ClusterState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "cluster fsm transition");
        self.state = next;
        context.publish_cluster_status(self.status()).await;
    }

    fn is_master_of<C: Clock>(&self, context: &Context<C>) -> bool {
        self.master_address.as_deref() == Some(context.mapper().self_address())
    }

    fn liveness_ok<C: Clock>(&self, context: &Context<C>) -> bool {
        let self_running = context
            .peer(context.mapper().self_address())
            .is_some_and(|p| p.state == PeerState::Running);
        let master_running = self
            .master_address
            .as_ref()
            .is_some_and(|addr| context.peer(addr).is_some_and(|p| p.state == PeerState::Running));

        self_running && master_running
    }

    fn broadcast_self_last<C: Clock>(
        &self,
        context: &Context<C>,
        build_request: fn(PeerAddress) -> Request,
    ) -> Vec<Request> {
        let mut running = context.running_addresses();
        running.sort();
        let self_address = context.mapper().self_address().clone();

        let mut actions: Vec<Request> = running
            .iter()
            .filter(|addr| **addr != self_address)
            .cloned()
            .map(build_request)
            .collect();

        if running.contains(&self_address) {
            actions.push(build_request(self_address));
        }

        actions
    }
}
