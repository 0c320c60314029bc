use serde::Deserialize;

/// Ports for the internal publish/subscribe bus and the loopback-only
/// external status bus (spec.md §4.5, §6).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransportConfig {
    pub internal_port: u16,
    pub event_port: u16,
}
