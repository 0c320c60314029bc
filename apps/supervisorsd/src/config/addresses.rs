use serde::Deserialize;
use supervisors_types::PeerAddress;

/// Static cluster membership (spec.md §6: `address_list`). Ordering is
/// significant — it is the election candidate order.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressesConfig {
    pub address_list: Vec<PeerAddress>,
    pub self_address: PeerAddress,
}
