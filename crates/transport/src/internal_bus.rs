use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use supervisors_types::InternalEvent;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::wire::JsonCodec;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const BROADCAST_CAPACITY: usize = 1024;
const CHECK_ADDRESS_TIMEOUT: Duration = Duration::from_secs(2);

/// A one-shot "port knock" against a peer's internal publisher socket
/// (spec.md glossary: "port-knocking"): answering the knock is this
/// implementation's authorization criterion for a `check_address` request
/// (spec.md §4.1, §6).
pub async fn check_address(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(CHECK_ADDRESS_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// The local end of the internal N×N publish/subscribe bus (spec.md §4.5,
/// §6): accepts one inbound connection per remote peer's subscriber and
/// fans every locally produced [`InternalEvent`] out to all of them,
/// including a connection from this node's own subscriber (spec.md: "a
/// single subscriber per peer that connects to every peer's publisher,
/// including its own").
pub struct InternalPublisher {
    tx: broadcast::Sender<InternalEvent>,
}

impl InternalPublisher {
    /// Binds the publisher socket and spawns the accept loop onto the
    /// given task tracker equivalent (the caller owns the returned
    /// `JoinHandle` via whatever executor it uses).
    pub async fn bind(
        addr: SocketAddr,
        cancellation: CancellationToken,
    ) -> std::io::Result<(Self, tokio::task::JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let publisher = Self { tx: tx.clone() };

        let handle = tokio::spawn(accept_loop(listener, tx, cancellation));
        Ok((publisher, handle))
    }

    /// Publishes an event to every currently connected subscriber. A send
    /// with no subscribers connected is not an error (spec.md §4.5: ticks
    /// are fired regardless of subscriber presence).
    pub fn publish(&self, event: InternalEvent) {
        let _ = self.tx.send(event);
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<InternalEvent>,
    cancellation: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                trace!("internal publisher accept loop cancelled");
                return;
            }
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else {
                    warn!("internal publisher accept failed");
                    continue;
                };

                debug!(%peer, "subscriber connected to internal publisher");
                tokio::spawn(serve_subscriber(stream, tx.subscribe(), cancellation.clone()));
            }
        }
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    mut rx: broadcast::Receiver<InternalEvent>,
    cancellation: CancellationToken,
) {
    let mut framed = Framed::new(stream, JsonCodec::<InternalEvent>::default());

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
                        warn!(skipped, "internal bus subscriber lagged, dropping frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

/// The local end of a connection to one remote peer's publisher
/// (spec.md §4.5, §6). Reconnects with a fixed backoff on disconnect,
/// forwarding every decoded frame into `out`.
pub async fn subscribe_to_peer(
    addr: SocketAddr,
    out: mpsc::Sender<InternalEvent>,
    cancellation: CancellationToken,
) {
    loop {
        if cancellation.is_cancelled() {
            return;
        }

        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!(%addr, "connected to peer publisher");
                let mut framed = Framed::new(stream, JsonCodec::<InternalEvent>::default());

                loop {
                    tokio::select! {
                        _ = cancellation.cancelled() => return,
                        frame = framed.next() => {
                            match frame {
                                Some(Ok(event)) => {
                                    if out.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Some(Err(err)) => {
                                    warn!(%addr, %err, "internal bus decode error, reconnecting");
                                    break;
                                }
                                None => {
                                    debug!(%addr, "peer publisher closed connection, reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(err) => {
                trace!(%addr, %err, "failed to connect to peer publisher, retrying");
            }
        }

        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}
