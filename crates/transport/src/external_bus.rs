use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use futures::SinkExt;
use supervisors_types::ExternalEvent;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::wire::JsonCodec;

const BROADCAST_CAPACITY: usize = 256;

/// The external status bus (spec.md §4.5, §6): loopback-only, read-only
/// fan-out of `SUPVISORS_STATUS`/`ADDRESS_STATUS`/`APPLICATION_STATUS`/
/// `PROCESS_STATUS` frames to any local client (the CLI, a dashboard).
/// Unlike the internal bus, there is no peer-to-peer subscription: it is
/// always `127.0.0.1`-bound and never dialed outward.
pub struct ExternalPublisher {
    tx: broadcast::Sender<ExternalEvent>,
}

impl ExternalPublisher {
    pub async fn bind(
        port: u16,
        cancellation: CancellationToken,
    ) -> std::io::Result<(Self, tokio::task::JoinHandle<()>)> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await?;
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let publisher = Self { tx: tx.clone() };

        let handle = tokio::spawn(accept_loop(listener, tx, cancellation));
        Ok((publisher, handle))
    }

    pub fn publish(&self, event: ExternalEvent) {
        let _ = self.tx.send(event);
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<ExternalEvent>,
    cancellation: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                trace!("external publisher accept loop cancelled");
                return;
            }
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else {
                    warn!("external publisher accept failed");
                    continue;
                };

                debug!(%peer, "client connected to external status bus");
                tokio::spawn(serve_client(stream, tx.subscribe(), cancellation.clone()));
            }
        }
    }
}

async fn serve_client(
    stream: tokio::net::TcpStream,
    mut rx: broadcast::Receiver<ExternalEvent>,
    cancellation: CancellationToken,
) {
    let mut framed = Framed::new(stream, JsonCodec::<ExternalEvent>::default());

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => return,
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if framed.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "external bus client lagged, dropping frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}
