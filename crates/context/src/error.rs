use supervisors_types::PeerAddress;
use thiserror::Error;

/// Errors raised while ingesting an event (spec.md §4.2, §7).
///
/// Both variants are recoverable: the caller logs and drops the event,
/// the peer's state is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("peer {0} is not a member of the address list")]
    UnknownPeer(PeerAddress),
    #[error("peer {0} is isolated and can no longer be ingested")]
    PeerIsolated(PeerAddress),
}
