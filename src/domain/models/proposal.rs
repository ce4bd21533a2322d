use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::models::utxo::UtxoRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Open,
    Sent,
    Cancelled,
    Expired,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Open => "open",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ProposalStatus::Open),
            "sent" => Ok(ProposalStatus::Sent),
            "cancelled" => Ok(ProposalStatus::Cancelled),
            "expired" => Ok(ProposalStatus::Expired),
            other => Err(format!("Unknown proposal status: {}", other)),
        }
    }
}

/// Output requested by the caller of the proposal builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRequest {
    pub address: String,
    pub value: i64,
    pub token: String,
    #[serde(default)]
    pub timelock: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub wallet_id: String,
    pub outputs: Vec<OutputRequest>,
    /// Inputs chosen by the caller; selection runs when absent
    #[serde(default)]
    pub inputs: Option<Vec<UtxoRef>>,
    #[serde(default)]
    pub input_selection_algo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalInput {
    pub tx_id: String,
    pub index: i32,
    pub token: String,
    pub address: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOutput {
    pub address: String,
    pub value: i64,
    pub token: String,
    pub timelock: Option<i64>,
}

/// Result of a successful proposal creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxProposal {
    pub proposal_id: String,
    pub wallet_id: String,
    pub status: ProposalStatus,
    pub inputs: Vec<ProposalInput>,
    pub outputs: Vec<ProposalOutput>,
}
