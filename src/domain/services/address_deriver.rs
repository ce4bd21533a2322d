use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::Address;
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DerivationError;

/// Derives wallet addresses and validates user supplied ones
pub trait AddressDeriver: Send + Sync {
    /// Derive `count` addresses starting at `start`, returned with their indexes
    fn derive_addresses(
        &self,
        xpubkey: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<(i32, String)>, DerivationError>;

    fn is_valid_address(&self, address: &str) -> bool;
}

/// Non-hardened BIP32 child derivation encoded as P2PKH
pub struct Bip32AddressDeriver {
    network: bitcoin::Network,
    secp: Secp256k1<VerifyOnly>,
}

impl fmt::Debug for Bip32AddressDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bip32AddressDeriver")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Bip32AddressDeriver {
    pub fn new(network: bitcoin::Network) -> Self {
        Self {
            network,
            secp: Secp256k1::verification_only(),
        }
    }
}

impl AddressDeriver for Bip32AddressDeriver {
    fn derive_addresses(
        &self,
        xpubkey: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<(i32, String)>, DerivationError> {
        let xpub =
            Xpub::from_str(xpubkey).map_err(|e| DerivationError::InvalidXpub(e.to_string()))?;

        let mut addresses = Vec::with_capacity(count as usize);
        for index in start..start.saturating_add(count) {
            let child_number = ChildNumber::from_normal_idx(index)
                .map_err(|_| DerivationError::InvalidIndex(index))?;
            let child = xpub
                .derive_pub(&self.secp, &[child_number])
                .map_err(|e| DerivationError::Other(e.to_string()))?;
            let address = Address::p2pkh(child.to_pub().pubkey_hash(), self.network);
            let index = i32::try_from(index).map_err(|_| DerivationError::InvalidIndex(index))?;
            addresses.push((index, address.to_string()));
        }

        Ok(addresses)
    }

    fn is_valid_address(&self, address: &str) -> bool {
        Address::from_str(address)
            .map(|unchecked| unchecked.is_valid_for_network(self.network))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    #[test]
    fn test_derivation_is_deterministic_and_distinct() {
        let deriver = Bip32AddressDeriver::new(bitcoin::Network::Bitcoin);
        let first = deriver.derive_addresses(XPUB, 0, 3).unwrap();
        let again = deriver.derive_addresses(XPUB, 0, 3).unwrap();
        assert_eq!(first, again);
        assert_eq!(
            first.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_ne!(first[0].1, first[1].1);
        assert_ne!(first[1].1, first[2].1);

        let tail = deriver.derive_addresses(XPUB, 2, 1).unwrap();
        assert_eq!(tail[0], first[2]);
    }

    #[test]
    fn test_derived_addresses_validate_on_their_network() {
        let deriver = Bip32AddressDeriver::new(bitcoin::Network::Bitcoin);
        let addresses = deriver.derive_addresses(XPUB, 0, 2).unwrap();
        for (_, address) in &addresses {
            assert!(deriver.is_valid_address(address));
        }
        let testnet = Bip32AddressDeriver::new(bitcoin::Network::Testnet);
        assert!(!testnet.is_valid_address(&addresses[0].1));
    }

    #[test]
    fn test_invalid_input() {
        let deriver = Bip32AddressDeriver::new(bitcoin::Network::Bitcoin);
        assert!(matches!(
            deriver.derive_addresses("not-an-xpub", 0, 1),
            Err(DerivationError::InvalidXpub(_))
        ));
        assert!(!deriver.is_valid_address("definitely not an address"));
    }
}
