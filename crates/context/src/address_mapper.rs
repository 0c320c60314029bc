use supervisors_types::PeerAddress;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressMapperError {
    #[error("self address {0} is not present in the configured address_list")]
    SelfNotInAddressList(PeerAddress),
}

/// Static membership: the canonical, ordered peer list and the identity of
/// "self" (spec.md §3, §4). The peer set is fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct AddressMapper {
    peers: Vec<PeerAddress>,
    self_address: PeerAddress,
}

impl AddressMapper {
    pub fn new(
        address_list: Vec<PeerAddress>,
        self_address: PeerAddress,
    ) -> Result<Self, AddressMapperError> {
        if !address_list.contains(&self_address) {
            return Err(AddressMapperError::SelfNotInAddressList(self_address));
        }

        Ok(Self {
            peers: address_list,
            self_address,
        })
    }

    pub fn peers(&self) -> &[PeerAddress] {
        &self.peers
    }

    pub fn self_address(&self) -> &PeerAddress {
        &self.self_address
    }

    pub fn is_self(&self, address: &PeerAddress) -> bool {
        address == &self.self_address
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.peers.contains(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(names: &[&str]) -> Vec<PeerAddress> {
        names.iter().map(|n| PeerAddress::new(*n)).collect()
    }

    #[test]
    fn rejects_self_not_in_list() {
        let err = AddressMapper::new(addrs(&["a", "b"]), PeerAddress::new("c")).unwrap_err();
        assert!(matches!(err, AddressMapperError::SelfNotInAddressList(_)));
    }

    #[test]
    fn accepts_self_in_list() {
        let mapper = AddressMapper::new(addrs(&["a", "b", "c"]), PeerAddress::new("b")).unwrap();
        assert!(mapper.is_self(&PeerAddress::new("b")));
        assert!(!mapper.is_self(&PeerAddress::new("a")));
        assert!(mapper.contains(&PeerAddress::new("c")));
        assert!(!mapper.contains(&PeerAddress::new("z")));
    }
}
