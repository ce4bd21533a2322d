use sea_orm::ConnectionTrait;

use crate::infrastructure::persistence::repositories::{
    AddressRepository, BalanceRepository, HistoryRepository, ProposalRepository, Repositories,
    TokenRepository, TransactionRepository, UtxoRepository, WalletRepository,
};

/// Factory for creating repositories.
/// Repositories borrow the handle they are built from, so a set created from a
/// `DatabaseTransaction` lives exactly as long as that unit of work.
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create all repositories over one connection or transaction
    pub fn create_repositories<C: ConnectionTrait>(conn: &C) -> Repositories<'_, C> {
        Repositories {
            address: Self::create_address_repository(conn),
            balance: Self::create_balance_repository(conn),
            history: Self::create_history_repository(conn),
            proposal: Self::create_proposal_repository(conn),
            token: Self::create_token_repository(conn),
            transaction: Self::create_transaction_repository(conn),
            utxo: Self::create_utxo_repository(conn),
            wallet: Self::create_wallet_repository(conn),
        }
    }

    /// Create an address repository
    pub fn create_address_repository<C: ConnectionTrait>(conn: &C) -> AddressRepository<'_, C> {
        AddressRepository::new(conn)
    }

    /// Create a balance repository
    pub fn create_balance_repository<C: ConnectionTrait>(conn: &C) -> BalanceRepository<'_, C> {
        BalanceRepository::new(conn)
    }

    /// Create a history repository
    pub fn create_history_repository<C: ConnectionTrait>(conn: &C) -> HistoryRepository<'_, C> {
        HistoryRepository::new(conn)
    }

    /// Create a proposal repository
    pub fn create_proposal_repository<C: ConnectionTrait>(conn: &C) -> ProposalRepository<'_, C> {
        ProposalRepository::new(conn)
    }

    /// Create a token repository
    pub fn create_token_repository<C: ConnectionTrait>(conn: &C) -> TokenRepository<'_, C> {
        TokenRepository::new(conn)
    }

    /// Create a transaction repository
    pub fn create_transaction_repository<C: ConnectionTrait>(
        conn: &C,
    ) -> TransactionRepository<'_, C> {
        TransactionRepository::new(conn)
    }

    /// Create a utxo repository
    pub fn create_utxo_repository<C: ConnectionTrait>(conn: &C) -> UtxoRepository<'_, C> {
        UtxoRepository::new(conn)
    }

    /// Create a wallet repository
    pub fn create_wallet_repository<C: ConnectionTrait>(conn: &C) -> WalletRepository<'_, C> {
        WalletRepository::new(conn)
    }
}
