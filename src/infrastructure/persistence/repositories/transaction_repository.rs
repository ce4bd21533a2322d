use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::fmt;

use crate::domain::models::TxRecord;
use crate::infrastructure::persistence::entities::transactions;
use crate::infrastructure::persistence::error::DbError;

const BLOCK_VERSIONS: [i32; 2] = [0, 3];

/// Repository for transaction and block records
pub struct TransactionRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for TransactionRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> TransactionRepository<'a, C> {
    /// Create a new TransactionRepository
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Get a transaction by id, voided or not
    pub async fn find(&self, tx_id: &str) -> Result<Option<TxRecord>, DbError> {
        let result = transactions::Entity::find_by_id(tx_id.to_string())
            .one(self.conn)
            .await?;

        Ok(result.map(Self::to_domain_model))
    }

    /// Insert a transaction, or reset a previously voided one
    pub async fn upsert(&self, record: &TxRecord) -> Result<(), DbError> {
        let model = transactions::ActiveModel {
            tx_id: Set(record.tx_id.clone()),
            height: Set(record.height),
            timestamp: Set(record.timestamp),
            version: Set(record.version),
            voided: Set(record.voided),
        };

        transactions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(transactions::Column::TxId)
                    .update_columns([
                        transactions::Column::Height,
                        transactions::Column::Timestamp,
                        transactions::Column::Version,
                        transactions::Column::Voided,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    /// Record the confirmation of a mempool transaction
    pub async fn confirm(
        &self,
        tx_id: &str,
        height: i32,
        timestamp: i64,
        version: i32,
    ) -> Result<(), DbError> {
        transactions::Entity::update_many()
            .col_expr(transactions::Column::Height, Expr::value(Some(height)))
            .col_expr(transactions::Column::Timestamp, Expr::value(timestamp))
            .col_expr(transactions::Column::Version, Expr::value(version))
            .filter(transactions::Column::TxId.eq(tx_id))
            .exec(self.conn)
            .await?;

        Ok(())
    }

    /// Non-voided block stored at `height`
    pub async fn block_at_height(&self, height: i32) -> Result<Option<TxRecord>, DbError> {
        let result = transactions::Entity::find()
            .filter(transactions::Column::Height.eq(height))
            .filter(transactions::Column::Version.is_in(BLOCK_VERSIONS))
            .filter(transactions::Column::Voided.eq(false))
            .one(self.conn)
            .await?;

        Ok(result.map(Self::to_domain_model))
    }

    /// Height of the best non-voided block
    pub async fn latest_block_height(&self) -> Result<Option<i32>, DbError> {
        let result = transactions::Entity::find()
            .filter(transactions::Column::Version.is_in(BLOCK_VERSIONS))
            .filter(transactions::Column::Voided.eq(false))
            .filter(transactions::Column::Height.is_not_null())
            .order_by_desc(transactions::Column::Height)
            .one(self.conn)
            .await?;

        Ok(result.and_then(|b| b.height))
    }

    /// Non-voided blocks, best first
    pub async fn blocks_descending(&self) -> Result<Vec<TxRecord>, DbError> {
        let results = transactions::Entity::find()
            .filter(transactions::Column::Version.is_in(BLOCK_VERSIONS))
            .filter(transactions::Column::Voided.eq(false))
            .filter(transactions::Column::Height.is_not_null())
            .order_by_desc(transactions::Column::Height)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Non-voided transactions and blocks confirmed above `height`
    pub async fn after_height(&self, height: i32) -> Result<Vec<TxRecord>, DbError> {
        let results = transactions::Entity::find()
            .filter(transactions::Column::Height.gt(height))
            .filter(transactions::Column::Voided.eq(false))
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    pub async fn mark_voided(&self, tx_ids: &[String]) -> Result<u64, DbError> {
        if tx_ids.is_empty() {
            return Ok(0);
        }

        let result = transactions::Entity::update_many()
            .col_expr(transactions::Column::Voided, Expr::value(true))
            .filter(transactions::Column::TxId.is_in(tx_ids.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Return transactions to the mempool
    pub async fn clear_height(&self, tx_ids: &[String]) -> Result<u64, DbError> {
        if tx_ids.is_empty() {
            return Ok(0);
        }

        let result = transactions::Entity::update_many()
            .col_expr(transactions::Column::Height, Expr::value(Option::<i32>::None))
            .filter(transactions::Column::TxId.is_in(tx_ids.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Remove block records above `height`
    pub async fn delete_blocks_after_height(&self, height: i32) -> Result<u64, DbError> {
        let result = transactions::Entity::delete_many()
            .filter(transactions::Column::Version.is_in(BLOCK_VERSIONS))
            .filter(transactions::Column::Height.gt(height))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    fn to_domain_model(model: transactions::Model) -> TxRecord {
        TxRecord {
            tx_id: model.tx_id,
            height: model.height,
            timestamp: model.timestamp,
            version: model.version,
            voided: model.voided,
        }
    }
}
