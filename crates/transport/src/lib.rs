//! Wire framing and socket plumbing for the internal pub/sub bus, the
//! external status bus, and the local request channel (C5/C6).

mod external_bus;
mod internal_bus;
mod request_channel;
mod wire;

pub use external_bus::ExternalPublisher;
pub use internal_bus::{check_address, subscribe_to_peer, InternalPublisher};
pub use request_channel::{request_channel, RequestReceiver, RequestSender};
pub use wire::{JsonCodec, WireError};

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::time::Duration;

    use supervisors_types::{InternalEvent, PeerAddress, TickEvent};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    #[tokio::test]
    async fn publisher_fans_out_ticks_to_a_connected_subscriber() {
        let cancellation = CancellationToken::new();
        let addr = loopback(28_733);
        let (publisher, _accept_handle) =
            InternalPublisher::bind(addr, cancellation.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(subscribe_to_peer(addr, tx, cancellation.clone()));

        // give the subscriber task a moment to connect before publishing.
        tokio::time::sleep(Duration::from_millis(50)).await;

        publisher.publish(InternalEvent::Tick(TickEvent {
            origin: PeerAddress::new("a"),
            when: 42,
        }));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("did not receive a frame in time")
            .expect("channel closed");

        match received {
            InternalEvent::Tick(tick) => {
                assert_eq!(tick.origin, PeerAddress::new("a"));
                assert_eq!(tick.when, 42);
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        cancellation.cancel();
    }

    #[tokio::test]
    async fn check_address_succeeds_against_a_listening_socket() {
        let addr = loopback(28_734);
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        assert!(check_address(addr).await);
    }

    #[tokio::test]
    async fn check_address_fails_against_a_closed_port() {
        let addr = loopback(28_735);
        assert!(!check_address(addr).await);
    }

    #[tokio::test]
    async fn request_channel_round_trips_a_request() {
        let (tx, mut rx) = request_channel();
        tx.send(supervisors_types::Request::Shutdown(PeerAddress::new("a")))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, supervisors_types::Request::Shutdown(addr) if addr == PeerAddress::new("a")));
    }
}
