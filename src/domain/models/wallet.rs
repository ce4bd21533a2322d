use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::models::balance::Authorities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    Creating,
    Ready,
    Error,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Creating => "creating",
            WalletStatus::Ready => "ready",
            WalletStatus::Error => "error",
        }
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(WalletStatus::Creating),
            "ready" => Ok(WalletStatus::Ready),
            "error" => Ok(WalletStatus::Error),
            other => Err(format!("Unknown wallet status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: String,
    pub xpubkey: String,
    pub max_gap: i32,
    pub status: WalletStatus,
    pub created_at: i64,
    pub ready_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    pub derivation_index: Option<i32>,
    pub wallet_id: Option<String>,
    pub transactions: i32,
}

/// Stored balance row of an address or a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_id: String,
    pub unlocked_balance: i64,
    pub locked_balance: i64,
    pub lock_expires: Option<i64>,
    pub unlocked_authorities: Authorities,
    pub locked_authorities: Authorities,
    pub transactions: i32,
}

/// History entry of an address or a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tx_id: String,
    pub token_id: String,
    pub balance: i64,
    pub timestamp: i64,
    pub voided: bool,
}
