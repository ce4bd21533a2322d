use serde::{Deserialize, Serialize};

use crate::domain::models::balance::Authorities;

/// Identifies an output by the transaction that created it and its position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoRef {
    pub tx_id: String,
    pub index: i32,
}

impl UtxoRef {
    pub fn new(tx_id: &str, index: i32) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            index,
        }
    }
}

/// An output tracked by the UTXO store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_id: String,
    pub index: i32,
    pub token_id: String,
    pub address: String,
    /// Zero for authority outputs
    pub value: i64,
    pub authorities: Authorities,
    pub timelock: Option<i64>,
    pub heightlock: Option<i32>,
    pub locked: bool,
    pub spent_by: Option<String>,
    pub tx_proposal_id: Option<String>,
    pub tx_proposal_index: Option<i32>,
}

impl Utxo {
    pub fn reference(&self) -> UtxoRef {
        UtxoRef::new(&self.tx_id, self.index)
    }

    pub fn is_authority(&self) -> bool {
        !self.authorities.is_empty()
    }
}

/// Criteria for listing UTXOs of a set of addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoFilter {
    pub addresses: Vec<String>,
    pub token_id: String,
    pub ignore_locked: bool,
    /// Only authority outputs holding all of these bits when set
    pub authority: Option<Authorities>,
    pub bigger_than: Option<i64>,
    pub smaller_than: Option<i64>,
    pub max_utxos: Option<u64>,
}

impl UtxoFilter {
    pub fn for_addresses(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            token_id: crate::domain::models::transaction::NATIVE_TOKEN.to_string(),
            ignore_locked: false,
            authority: None,
            bigger_than: None,
            smaller_than: None,
            max_utxos: None,
        }
    }
}
