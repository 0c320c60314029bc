//! The cluster state machine (C7) and the pluggable Deployer/Stopper/
//! Conciliator strategies it drives during deployment, conflict
//! resolution, restart and shutdown (C9).

mod fsm;
mod strategies;

pub use fsm::ClusterFsm;
pub use strategies::{
    ConciliationStrategy, Conciliator, Deployer, NoopConciliator, NoopDeployer, NoopStopper,
    Stopper,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use event_bus::EventBus;
    use supervisors_context::{Context, ContextOptions, TestClock};
    use supervisors_types::{AuthorizationEvent, NoRules, PeerAddress};

    use super::*;

    fn addrs(names: &[&str]) -> Vec<PeerAddress> {
        names.iter().map(|n| PeerAddress::new(*n)).collect()
    }

    async fn fixture(
        self_name: &str,
        peers: &[&str],
    ) -> (ClusterFsm<NoopDeployer, NoopStopper, NoopConciliator>, Context<TestClock>) {
        let mut bus = EventBus::default();
        bus.register::<supervisors_types::AddressStatusPublished>(None);
        bus.register::<supervisors_types::ProcessStatusPublished>(None);
        bus.register::<supervisors_types::ApplicationStatusPublished>(None);
        bus.register::<supervisors_types::SupvisorsStatusPublished>(None);

        let mapper =
            supervisors_context::AddressMapper::new(addrs(peers), PeerAddress::new(self_name))
                .unwrap();
        let context = Context::new(
            mapper,
            Arc::new(NoRules),
            ContextOptions::default(),
            TestClock::new(0),
            &bus,
        )
        .unwrap();

        let fsm = ClusterFsm::new(
            10,
            ConciliationStrategy::default(),
            NoopDeployer,
            NoopStopper,
            NoopConciliator,
        );

        (fsm, context)
    }

    async fn run_all_to_running(context: &mut Context<TestClock>, peers: &[&str]) {
        for (i, peer) in peers.iter().enumerate() {
            context
                .on_tick(PeerAddress::new(*peer), i as u64)
                .await
                .unwrap();
            context
                .on_authorization(AuthorizationEvent {
                    origin: PeerAddress::new(*peer),
                    authorized: true,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn elects_lexicographically_lowest_peer_as_master() {
        let (mut fsm, mut context) = fixture("a", &["a", "b", "c"]).await;
        fsm.start(&mut context, 0).await;
        run_all_to_running(&mut context, &["a", "b", "c"]).await;

        // One event settles Initialization -> Deployment -> Operation in a
        // single call, since the no-op deployer is idle the instant it's asked.
        fsm.advance(&mut context, 1).await;

        assert_eq!(fsm.state(), ClusterState::Operation);
        assert_eq!(fsm.master_address(), Some(&PeerAddress::new("a")));
    }

    #[tokio::test]
    async fn synchro_timeout_moves_on_without_every_peer_responding() {
        let (mut fsm, mut context) = fixture("a", &["a", "b", "c"]).await;
        fsm.start(&mut context, 0).await;
        run_all_to_running(&mut context, &["a", "b"]).await;

        assert!(fsm.advance(&mut context, 5).await.is_empty());
        assert_eq!(fsm.state(), ClusterState::Initialization);

        fsm.advance(&mut context, 11).await;
        assert_eq!(fsm.state(), ClusterState::Operation);
        assert_eq!(fsm.master_address(), Some(&PeerAddress::new("a")));
    }

    #[tokio::test]
    async fn deployment_falls_through_to_operation_in_the_same_advance_call() {
        let (mut fsm, mut context) = fixture("a", &["a", "b"]).await;
        fsm.start(&mut context, 0).await;
        run_all_to_running(&mut context, &["a", "b"]).await;

        fsm.advance(&mut context, 1).await;
        assert_eq!(fsm.state(), ClusterState::Operation);
    }

    #[tokio::test]
    async fn restart_broadcasts_to_every_running_peer_with_self_last() {
        let (mut fsm, mut context) = fixture("b", &["a", "b", "c"]).await;
        fsm.start(&mut context, 0).await;
        run_all_to_running(&mut context, &["a", "b", "c"]).await;
        fsm.advance(&mut context, 1).await;
        fsm.advance(&mut context, 1).await;

        fsm.request_restart(&mut context).await;
        let requests = fsm.advance(&mut context, 2).await;

        assert_eq!(fsm.state(), ClusterState::Shutdown);
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests.last(),
            Some(&supervisors_types::Request::Restart(PeerAddress::new("b")))
        );
    }
}
