//! Per-peer liveness and isolation (C1/C2), the process/application model
//! (C3), and the `Context` that aggregates them (C4).

mod address_mapper;
mod clock;
mod context;
mod error;
mod process_model;

pub use address_mapper::{AddressMapper, AddressMapperError};
pub use clock::{Clock, SystemClock, TestClock};
pub use context::{Context, ContextOptions, RUNNING_TIMEOUT_SECS};
pub use error::ContextError;
pub use process_model::ProcessModel;
