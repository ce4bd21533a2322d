pub mod balance;
pub mod proposal;
pub mod transaction;
pub mod utxo;
pub mod wallet;

pub use balance::{Authorities, AuthorityDelta, Balance, TokenBalanceMap};
pub use proposal::{
    OutputRequest, ProposalInput, ProposalOutput, ProposalRequest, ProposalStatus, TxProposal,
};
pub use transaction::{
    DecodedScript, TxInput, TxOutput, TxPayload, TxRecord, TxVersion, NATIVE_TOKEN,
    TOKEN_AUTHORITY_MASK,
};
pub use utxo::{Utxo, UtxoFilter, UtxoRef};
pub use wallet::{AddressInfo, HistoryEntry, TokenBalance, Wallet, WalletStatus};
