use event_bus::Event;
use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::process::Namespec;

/// Header of a frame carried over the local push/pull request channel
/// (spec.md §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestHeader {
    CheckAddress,
    IsolateAddresses,
    StartProcess,
    StopProcess,
    Restart,
    Shutdown,
}

/// An outbound request produced by the control thread (Context or FSM) and
/// drained by the I/O loop / request dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Event)]
pub enum Request {
    CheckAddress(PeerAddress),
    IsolateAddresses(Vec<PeerAddress>),
    StartProcess {
        address: PeerAddress,
        namespec: Namespec,
        extra_args: String,
    },
    StopProcess {
        address: PeerAddress,
        namespec: Namespec,
    },
    Restart(PeerAddress),
    Shutdown(PeerAddress),
}

impl Request {
    pub fn header(&self) -> RequestHeader {
        match self {
            Self::CheckAddress(_) => RequestHeader::CheckAddress,
            Self::IsolateAddresses(_) => RequestHeader::IsolateAddresses,
            Self::StartProcess { .. } => RequestHeader::StartProcess,
            Self::StopProcess { .. } => RequestHeader::StopProcess,
            Self::Restart(_) => RequestHeader::Restart,
            Self::Shutdown(_) => RequestHeader::Shutdown,
        }
    }
}
