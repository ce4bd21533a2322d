use serde::{Deserialize, Serialize};

/// Token id of the native token
pub const NATIVE_TOKEN: &str = "00";

/// `token_data` bit flagging an authority output
pub const TOKEN_AUTHORITY_MASK: i32 = 0b1000_0000;

/// Transaction kinds distinguished by the `version` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxVersion {
    Block,
    Regular,
    CreateToken,
    MergedMinedBlock,
    Unknown(i32),
}

impl From<i32> for TxVersion {
    fn from(version: i32) -> Self {
        match version {
            0 => TxVersion::Block,
            1 => TxVersion::Regular,
            2 => TxVersion::CreateToken,
            3 => TxVersion::MergedMinedBlock,
            other => TxVersion::Unknown(other),
        }
    }
}

impl TxVersion {
    pub fn is_block(&self) -> bool {
        matches!(self, TxVersion::Block | TxVersion::MergedMinedBlock)
    }
}

/// Decoded output script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedScript {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub timelock: Option<i64>,
}

/// An output created by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount, or the authority bitmask for authority outputs
    pub value: i64,
    pub token_data: i32,
    /// Token id (`"00"` for the native token)
    pub token: String,
    #[serde(default)]
    pub decoded: DecodedScript,
}

/// A reference to a previous output, carrying that output's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub tx_id: String,
    pub index: i32,
    pub value: i64,
    pub token_data: i32,
    pub token: String,
    #[serde(default)]
    pub decoded: DecodedScript,
}

impl TxOutput {
    pub fn is_authority(&self) -> bool {
        self.token_data & TOKEN_AUTHORITY_MASK != 0
    }
}

impl TxInput {
    pub fn is_authority(&self) -> bool {
        self.token_data & TOKEN_AUTHORITY_MASK != 0
    }
}

/// A transaction or block as delivered by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPayload {
    pub tx_id: String,
    /// Block height for blocks and confirmed transactions, `None` while in mempool
    #[serde(default)]
    pub height: Option<i32>,
    pub timestamp: i64,
    pub version: i32,
    #[serde(default)]
    pub inputs: Vec<TxInput>,
    #[serde(default)]
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub token_symbol: Option<String>,
}

impl TxPayload {
    pub fn kind(&self) -> TxVersion {
        TxVersion::from(self.version)
    }

    pub fn is_block(&self) -> bool {
        self.kind().is_block()
    }
}

/// Stored transaction record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub tx_id: String,
    pub height: Option<i32>,
    pub timestamp: i64,
    pub version: i32,
    pub voided: bool,
}
