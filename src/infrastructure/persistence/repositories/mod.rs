pub mod address_repository;
pub mod balance_repository;
pub mod history_repository;
pub mod proposal_repository;
pub mod token_repository;
pub mod transaction_repository;
pub mod utxo_repository;
pub mod wallet_repository;

pub use address_repository::AddressRepository;
pub use balance_repository::BalanceRepository;
pub use history_repository::HistoryRepository;
pub use proposal_repository::{ProposalRecord, ProposalRepository};
pub use token_repository::TokenRepository;
pub use transaction_repository::TransactionRepository;
pub use utxo_repository::{SpendOutcome, UtxoRepository};
pub use wallet_repository::WalletRepository;

/// Collection of all repositories bound to one connection or transaction
pub struct Repositories<'a, C> {
    /// Repository for address records
    pub address: AddressRepository<'a, C>,
    /// Repository for address and wallet balances
    pub balance: BalanceRepository<'a, C>,
    /// Repository for address and wallet history
    pub history: HistoryRepository<'a, C>,
    /// Repository for transaction proposals
    pub proposal: ProposalRepository<'a, C>,
    /// Repository for token metadata
    pub token: TokenRepository<'a, C>,
    /// Repository for transaction records
    pub transaction: TransactionRepository<'a, C>,
    /// Repository for the UTXO store
    pub utxo: UtxoRepository<'a, C>,
    /// Repository for wallets
    pub wallet: WalletRepository<'a, C>,
}
