use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TxProposals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TxProposals::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TxProposals::WalletId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(TxProposals::Status)
                            .string_len(16)
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(TxProposals::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(TxProposals::UpdatedAt).big_integer())
                    .to_owned(),
            )
            .await?;

        // Index for the expiry sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_tx_proposals_status_created")
                    .table(TxProposals::Table)
                    .col(TxProposals::Status)
                    .col(TxProposals::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TxProposalOutputs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TxProposalOutputs::TxProposalId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxProposalOutputs::OutputIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxProposalOutputs::Address)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxProposalOutputs::TokenId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxProposalOutputs::Value)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TxProposalOutputs::Timelock).big_integer())
                    .primary_key(
                        Index::create()
                            .col(TxProposalOutputs::TxProposalId)
                            .col(TxProposalOutputs::OutputIndex),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TxProposalOutputs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TxProposals::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum TxProposals {
    Table,
    Id,
    WalletId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum TxProposalOutputs {
    Table,
    TxProposalId,
    OutputIndex,
    Address,
    TokenId,
    Value,
    Timelock,
}
