use std::error::Error;
use std::fmt;

use crate::domain::models::UtxoRef;
use crate::infrastructure::peer::PeerError;
use crate::infrastructure::persistence::error::DbError;

/// Error type for address derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    InvalidXpub(String),
    InvalidIndex(u32),
    Other(String),
}

impl fmt::Display for DerivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationError::InvalidXpub(msg) => write!(f, "Invalid xpubkey: {}", msg),
            DerivationError::InvalidIndex(index) => {
                write!(f, "Invalid derivation index: {}", index)
            }
            DerivationError::Other(msg) => write!(f, "Derivation error: {}", msg),
        }
    }
}

impl Error for DerivationError {}

/// Error type for transaction ingest
#[derive(Debug)]
pub enum IngestError {
    /// Transaction is on the network ignore list
    Rejected(String),
    /// A different block is already stored at this height
    ReorgDetected { height: i32, stored_block: String },
    InvalidPayload(String),
    /// Stored state contradicts the payload; the unit of work is rolled back
    Consistency(String),
    Derivation(DerivationError),
    DbError(DbError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Rejected(tx_id) => {
                write!(f, "Rejected tx {}: part of the genesis transactions", tx_id)
            }
            IngestError::ReorgDetected {
                height,
                stored_block,
            } => write!(
                f,
                "Reorg detected at height {} (stored block {})",
                height, stored_block
            ),
            IngestError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            IngestError::Consistency(msg) => write!(f, "Consistency violation: {}", msg),
            IngestError::Derivation(e) => write!(f, "Derivation error: {}", e),
            IngestError::DbError(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Derivation(e) => Some(e),
            IngestError::DbError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for IngestError {
    fn from(error: DbError) -> Self {
        IngestError::DbError(error)
    }
}

impl From<sea_orm::DbErr> for IngestError {
    fn from(error: sea_orm::DbErr) -> Self {
        IngestError::DbError(DbError::from(error))
    }
}

impl From<DerivationError> for IngestError {
    fn from(error: DerivationError) -> Self {
        IngestError::Derivation(error)
    }
}

/// Error type for reorg resolution
#[derive(Debug)]
pub enum ReorgError {
    PeerError(PeerError),
    /// No stored block matches the peer's chain
    NoCommonBlock,
    Consistency(String),
    DbError(DbError),
}

impl fmt::Display for ReorgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReorgError::PeerError(e) => write!(f, "Peer error: {}", e),
            ReorgError::NoCommonBlock => write!(f, "No common block with the peer chain"),
            ReorgError::Consistency(msg) => write!(f, "Consistency violation: {}", msg),
            ReorgError::DbError(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl Error for ReorgError {}

impl From<PeerError> for ReorgError {
    fn from(error: PeerError) -> Self {
        ReorgError::PeerError(error)
    }
}

impl From<DbError> for ReorgError {
    fn from(error: DbError) -> Self {
        ReorgError::DbError(error)
    }
}

impl From<sea_orm::DbErr> for ReorgError {
    fn from(error: sea_orm::DbErr) -> Self {
        ReorgError::DbError(DbError::from(error))
    }
}

impl From<IngestError> for ReorgError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::DbError(e) => ReorgError::DbError(e),
            other => ReorgError::Consistency(other.to_string()),
        }
    }
}

/// Error type for wallet loading and reads
#[derive(Debug)]
pub enum WalletError {
    NotFound(String),
    NotReady(String),
    InvalidParameter(String),
    Derivation(DerivationError),
    Consistency(String),
    DbError(DbError),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::NotFound(id) => write!(f, "Wallet not found: {}", id),
            WalletError::NotReady(id) => write!(f, "Wallet not ready: {}", id),
            WalletError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            WalletError::Derivation(e) => write!(f, "Derivation error: {}", e),
            WalletError::Consistency(msg) => write!(f, "Consistency violation: {}", msg),
            WalletError::DbError(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl Error for WalletError {}

impl From<DbError> for WalletError {
    fn from(error: DbError) -> Self {
        WalletError::DbError(error)
    }
}

impl From<sea_orm::DbErr> for WalletError {
    fn from(error: sea_orm::DbErr) -> Self {
        WalletError::DbError(DbError::from(error))
    }
}

impl From<DerivationError> for WalletError {
    fn from(error: DerivationError) -> Self {
        WalletError::Derivation(error)
    }
}

impl From<IngestError> for WalletError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::DbError(e) => WalletError::DbError(e),
            IngestError::Derivation(e) => WalletError::Derivation(e),
            other => WalletError::Consistency(other.to_string()),
        }
    }
}

/// Error type for transaction proposals
#[derive(Debug)]
pub enum ProposalError {
    InvalidPayload(String),
    MissingParameter(String),
    TooManyOutputs { max: usize, requested: usize },
    TooManyInputs { max: usize, requested: usize },
    InvalidSelectionAlgo(String),
    WalletNotFound(String),
    WalletNotReady(String),
    InsufficientFunds {
        token_id: String,
        requested: i64,
        available: i64,
    },
    InputsNotFound(Vec<UtxoRef>),
    InsufficientInputs {
        token_id: String,
        requested: i64,
        available: i64,
    },
    NoChangeAddress,
    /// Some inputs were spent or reserved by another proposal
    ReservationConflict(Vec<UtxoRef>),
    ProposalNotFound(String),
    InvalidStatus { proposal_id: String, status: String },
    DbError(DbError),
}

impl ProposalError {
    /// Stable error code for the request-handling layer
    pub fn code(&self) -> &'static str {
        match self {
            ProposalError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ProposalError::MissingParameter(_) => "MISSING_PARAMETER",
            ProposalError::TooManyOutputs { .. } => "TOO_MANY_OUTPUTS",
            ProposalError::TooManyInputs { .. } => "TOO_MANY_INPUTS",
            ProposalError::InvalidSelectionAlgo(_) => "INVALID_SELECTION_ALGO",
            ProposalError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            ProposalError::WalletNotReady(_) => "WALLET_NOT_READY",
            ProposalError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            ProposalError::InputsNotFound(_) => "INPUTS_NOT_FOUND",
            ProposalError::InsufficientInputs { .. } => "INSUFFICIENT_INPUTS",
            ProposalError::NoChangeAddress => "NO_CHANGE_ADDRESS",
            ProposalError::ReservationConflict(_) => "INPUTS_ALREADY_USED",
            ProposalError::ProposalNotFound(_) => "TX_PROPOSAL_NOT_FOUND",
            ProposalError::InvalidStatus { .. } => "TX_PROPOSAL_NOT_OPEN",
            ProposalError::DbError(_) => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ProposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            ProposalError::MissingParameter(name) => write!(f, "Missing parameter: {}", name),
            ProposalError::TooManyOutputs { max, requested } => {
                write!(f, "Too many outputs: {} (max {})", requested, max)
            }
            ProposalError::TooManyInputs { max, requested } => {
                write!(f, "Too many inputs: {} (max {})", requested, max)
            }
            ProposalError::InvalidSelectionAlgo(name) => {
                write!(f, "Invalid input selection algorithm: {}", name)
            }
            ProposalError::WalletNotFound(id) => write!(f, "Wallet not found: {}", id),
            ProposalError::WalletNotReady(id) => write!(f, "Wallet not ready: {}", id),
            ProposalError::InsufficientFunds {
                token_id,
                requested,
                available,
            } => write!(
                f,
                "Insufficient funds of token {}: requested {}, available {}",
                token_id, requested, available
            ),
            ProposalError::InputsNotFound(missing) => {
                write!(f, "Inputs not found: {}", format_refs(missing))
            }
            ProposalError::InsufficientInputs {
                token_id,
                requested,
                available,
            } => write!(
                f,
                "Insufficient inputs of token {}: requested {}, inputs sum {}",
                token_id, requested, available
            ),
            ProposalError::NoChangeAddress => write!(f, "Wallet has no unused address for change"),
            ProposalError::ReservationConflict(refs) => {
                write!(f, "Inputs already used: {}", format_refs(refs))
            }
            ProposalError::ProposalNotFound(id) => write!(f, "Tx proposal not found: {}", id),
            ProposalError::InvalidStatus {
                proposal_id,
                status,
            } => write!(f, "Tx proposal {} is {}", proposal_id, status),
            ProposalError::DbError(e) => write!(f, "Database error: {}", e),
        }
    }
}

fn format_refs(refs: &[UtxoRef]) -> String {
    refs.iter()
        .map(|r| format!("{}:{}", r.tx_id, r.index))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error for ProposalError {}

impl From<DbError> for ProposalError {
    fn from(error: DbError) -> Self {
        ProposalError::DbError(error)
    }
}

impl From<sea_orm::DbErr> for ProposalError {
    fn from(error: sea_orm::DbErr) -> Self {
        ProposalError::DbError(DbError::from(error))
    }
}
