use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::fmt;

use crate::domain::models::{Wallet, WalletStatus};
use crate::infrastructure::persistence::entities::wallets;
use crate::infrastructure::persistence::error::DbError;

/// Repository for wallet records
pub struct WalletRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for WalletRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> WalletRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(&self, wallet_id: &str) -> Result<Option<Wallet>, DbError> {
        let result = wallets::Entity::find_by_id(wallet_id.to_string())
            .one(self.conn)
            .await?;

        result.map(Self::to_domain_model).transpose()
    }

    pub async fn find_many(&self, wallet_ids: &[String]) -> Result<Vec<Wallet>, DbError> {
        if wallet_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = wallets::Entity::find()
            .filter(wallets::Column::Id.is_in(wallet_ids.iter().cloned()))
            .all(self.conn)
            .await?;

        results.into_iter().map(Self::to_domain_model).collect()
    }

    /// Like `find_many`, but holds the wallet rows for update until the
    /// current transaction ends. Rows are taken in id order.
    pub async fn lock_many(&self, wallet_ids: &[String]) -> Result<Vec<Wallet>, DbError> {
        if wallet_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = wallets::Entity::find()
            .filter(wallets::Column::Id.is_in(wallet_ids.iter().cloned()))
            .order_by_asc(wallets::Column::Id)
            .lock_exclusive()
            .all(self.conn)
            .await?;

        results.into_iter().map(Self::to_domain_model).collect()
    }

    pub async fn insert(&self, wallet: &Wallet) -> Result<(), DbError> {
        let model = wallets::ActiveModel {
            id: Set(wallet.wallet_id.clone()),
            xpubkey: Set(wallet.xpubkey.clone()),
            max_gap: Set(wallet.max_gap),
            status: Set(wallet.status.as_str().to_string()),
            created_at: Set(wallet.created_at),
            ready_at: Set(wallet.ready_at),
        };

        model.insert(self.conn).await?;
        Ok(())
    }

    pub async fn set_status(
        &self,
        wallet_id: &str,
        status: WalletStatus,
        ready_at: Option<i64>,
    ) -> Result<(), DbError> {
        wallets::Entity::update_many()
            .col_expr(wallets::Column::Status, Expr::value(status.as_str()))
            .col_expr(wallets::Column::ReadyAt, Expr::value(ready_at))
            .filter(wallets::Column::Id.eq(wallet_id))
            .exec(self.conn)
            .await?;

        Ok(())
    }

    fn to_domain_model(model: wallets::Model) -> Result<Wallet, DbError> {
        let status = model
            .status
            .parse::<WalletStatus>()
            .map_err(DbError::QueryError)?;

        Ok(Wallet {
            wallet_id: model.id,
            xpubkey: model.xpubkey,
            max_gap: model.max_gap,
            status,
            created_at: model.created_at,
            ready_at: model.ready_at,
        })
    }
}
