//! Shared data model for the cluster coordination core.
//!
//! Every other crate in the workspace (`context`, `transport`, `fsm`,
//! `dispatcher`, `rules`) depends on this crate for the vocabulary it uses
//! to talk about peers, processes, applications and the cluster state
//! machine, so that no crate needs to reach into another's internals.

mod address;
mod application;
mod cluster;
mod events;
mod peer;
mod process;
mod requests;
mod rules;

pub use address::PeerAddress;
pub use application::{
    ApplicationRules, ApplicationStatus, ProcessRules, RequiredProcessFailure,
    RunningFailureStrategy,
};
pub use cluster::{ClusterState, SupvisorsStatus};
pub use events::{
    AddressStatusPublished, ApplicationStatusPublished, AuthorizationEvent, ExternalEvent,
    ExternalHeader, InternalEvent, InternalHeader, ProcessEvent, ProcessStatusPublished,
    StatisticsEvent, SupvisorsStatusPublished, TickEvent,
};
pub use peer::{PeerState, PeerStatus};
pub use process::{LocalProcessInfo, Namespec, ProcessState, ProcessStatus};
pub use requests::{Request, RequestHeader};
pub use rules::{NoRules, RulesSource};
