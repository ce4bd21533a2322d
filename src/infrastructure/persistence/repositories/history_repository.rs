use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::models::HistoryEntry;
use crate::infrastructure::persistence::entities::{address_tx_history, wallet_tx_history};
use crate::infrastructure::persistence::error::DbError;

/// Repository for address and wallet transaction history
pub struct HistoryRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for HistoryRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> HistoryRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Write history rows per (address, entry). A row left voided by a reorg is revived.
    pub async fn save_address_history(
        &self,
        rows: &[(String, HistoryEntry)],
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let models = rows.iter().map(|(address, entry)| address_tx_history::ActiveModel {
            address: Set(address.clone()),
            tx_id: Set(entry.tx_id.clone()),
            token_id: Set(entry.token_id.clone()),
            balance: Set(entry.balance),
            timestamp: Set(entry.timestamp),
            voided: Set(entry.voided),
        });

        address_tx_history::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    address_tx_history::Column::Address,
                    address_tx_history::Column::TxId,
                    address_tx_history::Column::TokenId,
                ])
                .update_columns([
                    address_tx_history::Column::Balance,
                    address_tx_history::Column::Timestamp,
                    address_tx_history::Column::Voided,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    pub async fn save_wallet_history(&self, rows: &[(String, HistoryEntry)]) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let models = rows.iter().map(|(wallet_id, entry)| wallet_tx_history::ActiveModel {
            wallet_id: Set(wallet_id.clone()),
            tx_id: Set(entry.tx_id.clone()),
            token_id: Set(entry.token_id.clone()),
            balance: Set(entry.balance),
            timestamp: Set(entry.timestamp),
            voided: Set(entry.voided),
        });

        wallet_tx_history::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    wallet_tx_history::Column::WalletId,
                    wallet_tx_history::Column::TxId,
                    wallet_tx_history::Column::TokenId,
                ])
                .update_columns([
                    wallet_tx_history::Column::Balance,
                    wallet_tx_history::Column::Timestamp,
                    wallet_tx_history::Column::Voided,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    /// Addresses with history rows for any of the given transactions
    pub async fn addresses_of_txs(&self, tx_ids: &[String]) -> Result<BTreeSet<String>, DbError> {
        if tx_ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let results = address_tx_history::Entity::find()
            .filter(address_tx_history::Column::TxId.is_in(tx_ids.iter().cloned()))
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(|h| h.address).collect())
    }

    /// Flag history of the given transactions as voided, for addresses and wallets
    pub async fn mark_voided(&self, tx_ids: &[String]) -> Result<(), DbError> {
        if tx_ids.is_empty() {
            return Ok(());
        }

        address_tx_history::Entity::update_many()
            .col_expr(address_tx_history::Column::Voided, Expr::value(true))
            .filter(address_tx_history::Column::TxId.is_in(tx_ids.iter().cloned()))
            .exec(self.conn)
            .await?;

        wallet_tx_history::Entity::update_many()
            .col_expr(wallet_tx_history::Column::Voided, Expr::value(true))
            .filter(wallet_tx_history::Column::TxId.is_in(tx_ids.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(())
    }

    /// Non-voided history of the given addresses
    pub async fn address_history(
        &self,
        addresses: &[String],
    ) -> Result<Vec<(String, HistoryEntry)>, DbError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let results = address_tx_history::Entity::find()
            .filter(address_tx_history::Column::Address.is_in(addresses.iter().cloned()))
            .filter(address_tx_history::Column::Voided.eq(false))
            .order_by_asc(address_tx_history::Column::Timestamp)
            .all(self.conn)
            .await?;

        Ok(results
            .into_iter()
            .map(|h| {
                (
                    h.address,
                    HistoryEntry {
                        tx_id: h.tx_id,
                        token_id: h.token_id,
                        balance: h.balance,
                        timestamp: h.timestamp,
                        voided: h.voided,
                    },
                )
            })
            .collect())
    }

    /// Non-voided history of a wallet
    pub async fn wallet_history(&self, wallet_id: &str) -> Result<Vec<HistoryEntry>, DbError> {
        let results = wallet_tx_history::Entity::find()
            .filter(wallet_tx_history::Column::WalletId.eq(wallet_id))
            .filter(wallet_tx_history::Column::Voided.eq(false))
            .order_by_asc(wallet_tx_history::Column::Timestamp)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::wallet_model_to_domain).collect())
    }

    /// One page of a wallet's history, newest first, voided rows included
    pub async fn wallet_history_page(
        &self,
        wallet_id: &str,
        skip: u64,
        count: u64,
    ) -> Result<Vec<HistoryEntry>, DbError> {
        let results = wallet_tx_history::Entity::find()
            .filter(wallet_tx_history::Column::WalletId.eq(wallet_id))
            .order_by_desc(wallet_tx_history::Column::Timestamp)
            .order_by_asc(wallet_tx_history::Column::TxId)
            .offset(skip)
            .limit(count)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::wallet_model_to_domain).collect())
    }

    fn wallet_model_to_domain(model: wallet_tx_history::Model) -> HistoryEntry {
        HistoryEntry {
            tx_id: model.tx_id,
            token_id: model.token_id,
            balance: model.balance,
            timestamp: model.timestamp,
            voided: model.voided,
        }
    }
}
