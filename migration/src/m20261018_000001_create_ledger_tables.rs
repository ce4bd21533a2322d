use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Transactions and blocks
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::TxId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::Height).integer())
                    .col(ColumnDef::new(Transactions::Timestamp).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Version).integer().not_null())
                    .col(
                        ColumnDef::new(Transactions::Voided)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_height")
                    .table(Transactions::Table)
                    .col(Transactions::Height)
                    .to_owned(),
            )
            .await?;

        // Unspent (and recently spent) outputs
        manager
            .create_table(
                Table::create()
                    .table(Utxos::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Utxos::TxId).string_len(64).not_null())
                    .col(ColumnDef::new(Utxos::OutputIndex).integer().not_null())
                    .col(ColumnDef::new(Utxos::TokenId).string_len(64).not_null())
                    .col(ColumnDef::new(Utxos::Address).string_len(64).not_null())
                    .col(ColumnDef::new(Utxos::Value).big_integer().not_null())
                    .col(
                        ColumnDef::new(Utxos::Authorities)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Utxos::Timelock).big_integer())
                    .col(ColumnDef::new(Utxos::Heightlock).integer())
                    .col(
                        ColumnDef::new(Utxos::Locked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Utxos::SpentBy).string_len(64))
                    .col(ColumnDef::new(Utxos::TxProposalId).string_len(36))
                    .col(ColumnDef::new(Utxos::TxProposalIndex).integer())
                    .primary_key(Index::create().col(Utxos::TxId).col(Utxos::OutputIndex))
                    .to_owned(),
            )
            .await?;

        // Index for balance rebuilds and selection by owner
        manager
            .create_index(
                Index::create()
                    .name("idx_utxos_address_token")
                    .table(Utxos::Table)
                    .col(Utxos::Address)
                    .col(Utxos::TokenId)
                    .to_owned(),
            )
            .await?;

        // Index for reorg cascades
        manager
            .create_index(
                Index::create()
                    .name("idx_utxos_spent_by")
                    .table(Utxos::Table)
                    .col(Utxos::SpentBy)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Addresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Addresses::Address)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Addresses::DerivationIndex).integer())
                    .col(ColumnDef::new(Addresses::WalletId).string_len(64))
                    .col(
                        ColumnDef::new(Addresses::Transactions)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_addresses_wallet")
                    .table(Addresses::Table)
                    .col(Addresses::WalletId)
                    .col(Addresses::DerivationIndex)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wallets::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Wallets::Xpubkey).string_len(120).not_null())
                    .col(ColumnDef::new(Wallets::MaxGap).integer().not_null())
                    .col(
                        ColumnDef::new(Wallets::Status)
                            .string_len(16)
                            .not_null()
                            .default("creating"),
                    )
                    .col(ColumnDef::new(Wallets::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Wallets::ReadyAt).big_integer())
                    .to_owned(),
            )
            .await?;

        // Balances per address and per wallet share one layout
        for (table, owner) in [
            (Balances::AddressBalances, Balances::Address),
            (Balances::WalletBalances, Balances::WalletId),
        ] {
            manager
                .create_table(
                    Table::create()
                        .table(table)
                        .if_not_exists()
                        .col(ColumnDef::new(owner).string_len(64).not_null())
                        .col(ColumnDef::new(Balances::TokenId).string_len(64).not_null())
                        .col(
                            ColumnDef::new(Balances::UnlockedBalance)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Balances::LockedBalance)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Balances::LockExpires).big_integer())
                        .col(
                            ColumnDef::new(Balances::UnlockedAuthorities)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Balances::LockedAuthorities)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Balances::Transactions)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .primary_key(Index::create().col(owner).col(Balances::TokenId))
                        .to_owned(),
                )
                .await?;
        }

        for (table, owner) in [
            (History::AddressTxHistory, History::Address),
            (History::WalletTxHistory, History::WalletId),
        ] {
            manager
                .create_table(
                    Table::create()
                        .table(table)
                        .if_not_exists()
                        .col(ColumnDef::new(owner).string_len(64).not_null())
                        .col(ColumnDef::new(History::TxId).string_len(64).not_null())
                        .col(ColumnDef::new(History::TokenId).string_len(64).not_null())
                        .col(ColumnDef::new(History::Balance).big_integer().not_null())
                        .col(ColumnDef::new(History::Timestamp).big_integer().not_null())
                        .col(
                            ColumnDef::new(History::Voided)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .primary_key(
                            Index::create()
                                .col(owner)
                                .col(History::TxId)
                                .col(History::TokenId),
                        )
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Tokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tokens::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tokens::Name).string_len(30).not_null())
                    .col(ColumnDef::new(Tokens::Symbol).string_len(5).not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tokens::Table).to_owned())
            .await?;
        for table in [History::WalletTxHistory, History::AddressTxHistory] {
            manager
                .drop_table(Table::drop().table(table).to_owned())
                .await?;
        }
        for table in [Balances::WalletBalances, Balances::AddressBalances] {
            manager
                .drop_table(Table::drop().table(table).to_owned())
                .await?;
        }
        manager
            .drop_table(Table::drop().table(Wallets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Addresses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Utxos::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Transactions {
    Table,
    TxId,
    Height,
    Timestamp,
    Version,
    Voided,
}

#[derive(Iden)]
enum Utxos {
    Table,
    TxId,
    OutputIndex,
    TokenId,
    Address,
    Value,
    Authorities,
    Timelock,
    Heightlock,
    Locked,
    SpentBy,
    TxProposalId,
    TxProposalIndex,
}

#[derive(Iden)]
enum Addresses {
    Table,
    Address,
    DerivationIndex,
    WalletId,
    Transactions,
}

#[derive(Iden)]
enum Wallets {
    Table,
    Id,
    Xpubkey,
    MaxGap,
    Status,
    CreatedAt,
    ReadyAt,
}

#[derive(Iden, Clone, Copy)]
enum Balances {
    AddressBalances,
    WalletBalances,
    Address,
    WalletId,
    TokenId,
    UnlockedBalance,
    LockedBalance,
    LockExpires,
    UnlockedAuthorities,
    LockedAuthorities,
    Transactions,
}

#[derive(Iden, Clone, Copy)]
enum History {
    AddressTxHistory,
    WalletTxHistory,
    Address,
    WalletId,
    TxId,
    TokenId,
    Balance,
    Timestamp,
    Voided,
}

#[derive(Iden)]
enum Tokens {
    Table,
    Id,
    Name,
    Symbol,
}
