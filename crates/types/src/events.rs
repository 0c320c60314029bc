use event_bus::Event;
use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;
use crate::application::ApplicationStatus;
use crate::cluster::SupvisorsStatus;
use crate::peer::PeerStatus;
use crate::process::{Namespec, ProcessState, ProcessStatus};

/// Header of a frame carried over the internal (N×N) publish/subscribe bus
/// (spec.md §4.5, §6). `Authorization` is this implementation's answer to
/// spec.md's "the remote peer replies over the authorization channel":
/// rather than a fourth physical channel, it is a fourth internal header,
/// carried over the same bus as `Tick`/`Process`/`Statistics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InternalHeader {
    Tick,
    Process,
    Statistics,
    Authorization,
}

/// A periodic heartbeat carrying the remote peer's monotonic time.
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct TickEvent {
    pub origin: PeerAddress,
    pub when: u64,
}

/// A process state change, as reported by one peer's local process manager.
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct ProcessEvent {
    pub origin: PeerAddress,
    pub namespec: Namespec,
    pub application_name: String,
    pub state: ProcessState,
    pub start_time: Option<u64>,
    pub stop_time: Option<u64>,
    pub extra_args: String,
}

/// A peer's reply stating whether it considers the caller a legitimate
/// member (spec.md glossary: "port-knocking").
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct AuthorizationEvent {
    pub origin: PeerAddress,
    pub authorized: bool,
}

/// Opaque per-process statistics payload (spec.md §9: schema out of scope).
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct StatisticsEvent {
    pub origin: PeerAddress,
    pub body: serde_json::Value,
}

/// Any frame that can arrive on the internal bus, as deserialized by the
/// transport layer before being redispatched to the typed event-bus
/// channels above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InternalEvent {
    Tick(TickEvent),
    Process(ProcessEvent),
    Statistics(StatisticsEvent),
    Authorization(AuthorizationEvent),
}

impl InternalEvent {
    pub fn header(&self) -> InternalHeader {
        match self {
            Self::Tick(_) => InternalHeader::Tick,
            Self::Process(_) => InternalHeader::Process,
            Self::Statistics(_) => InternalHeader::Statistics,
            Self::Authorization(_) => InternalHeader::Authorization,
        }
    }

    pub fn origin(&self) -> &PeerAddress {
        match self {
            Self::Tick(e) => &e.origin,
            Self::Process(e) => &e.origin,
            Self::Statistics(e) => &e.origin,
            Self::Authorization(e) => &e.origin,
        }
    }
}

/// Header of a frame carried over the (loopback-only) external status bus
/// (spec.md §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalHeader {
    SupvisorsStatus,
    AddressStatus,
    ApplicationStatus,
    ProcessStatus,
}

impl ExternalHeader {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SupvisorsStatus => "SUPVISORS_STATUS",
            Self::AddressStatus => "ADDRESS_STATUS",
            Self::ApplicationStatus => "APPLICATION_STATUS",
            Self::ProcessStatus => "PROCESS_STATUS",
        }
    }
}

/// A two-frame external status message: `(header, JSON body)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub header: ExternalHeader,
    pub body: serde_json::Value,
}

/// Published by the Context whenever cluster state changes; forwarded
/// onto the external bus by the transport layer as `SUPVISORS_STATUS`.
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct SupvisorsStatusPublished(pub SupvisorsStatus);

/// Published by the Context whenever a peer's liveness state changes;
/// forwarded onto the external bus as `ADDRESS_STATUS`.
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct AddressStatusPublished(pub PeerStatus);

/// Published by the Context whenever a process status changes; forwarded
/// onto the external bus as `PROCESS_STATUS`.
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct ProcessStatusPublished(pub ProcessStatus);

/// Published by the Context whenever an application status changes;
/// forwarded onto the external bus as `APPLICATION_STATUS`.
#[derive(Debug, Clone, Serialize, Deserialize, Event)]
pub struct ApplicationStatusPublished(pub ApplicationStatus);
