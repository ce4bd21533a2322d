use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::fmt;

use crate::domain::models::AddressInfo;
use crate::infrastructure::persistence::entities::addresses;
use crate::infrastructure::persistence::error::DbError;

/// Repository for address records and their wallet ownership
pub struct AddressRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for AddressRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> AddressRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(&self, address: &str) -> Result<Option<AddressInfo>, DbError> {
        let result = addresses::Entity::find_by_id(address.to_string())
            .one(self.conn)
            .await?;

        Ok(result.map(Self::to_domain_model))
    }

    pub async fn find_many(&self, list: &[String]) -> Result<Vec<AddressInfo>, DbError> {
        if list.is_empty() {
            return Ok(Vec::new());
        }

        let results = addresses::Entity::find()
            .filter(addresses::Column::Address.is_in(list.iter().cloned()))
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Create rows for unknown addresses with zero transactions
    pub async fn ensure(&self, list: &[String]) -> Result<(), DbError> {
        if list.is_empty() {
            return Ok(());
        }

        let models = list.iter().map(|address| addresses::ActiveModel {
            address: Set(address.clone()),
            derivation_index: Set(None),
            wallet_id: Set(None),
            transactions: Set(0),
        });

        addresses::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(addresses::Column::Address)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    /// Count one more transaction for each address
    pub async fn increment_transactions(&self, list: &[String]) -> Result<(), DbError> {
        if list.is_empty() {
            return Ok(());
        }

        addresses::Entity::update_many()
            .col_expr(
                addresses::Column::Transactions,
                Expr::col(addresses::Column::Transactions).add(1),
            )
            .filter(addresses::Column::Address.is_in(list.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(())
    }

    pub async fn set_transactions(&self, address: &str, transactions: i32) -> Result<(), DbError> {
        addresses::Entity::update_many()
            .col_expr(addresses::Column::Transactions, Expr::value(transactions))
            .filter(addresses::Column::Address.eq(address))
            .exec(self.conn)
            .await?;

        Ok(())
    }

    /// Attach an address to a wallet at its derivation index, creating it if needed
    pub async fn claim(&self, address: &str, wallet_id: &str, index: i32) -> Result<(), DbError> {
        let model = addresses::ActiveModel {
            address: Set(address.to_string()),
            derivation_index: Set(Some(index)),
            wallet_id: Set(Some(wallet_id.to_string())),
            transactions: Set(0),
        };

        addresses::Entity::insert(model)
            .on_conflict(
                OnConflict::column(addresses::Column::Address)
                    .update_columns([
                        addresses::Column::DerivationIndex,
                        addresses::Column::WalletId,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    /// Addresses of a wallet ordered by derivation index
    pub async fn wallet_addresses(&self, wallet_id: &str) -> Result<Vec<AddressInfo>, DbError> {
        let results = addresses::Entity::find()
            .filter(addresses::Column::WalletId.eq(wallet_id))
            .order_by_asc(addresses::Column::DerivationIndex)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Wallet addresses that never appeared in a transaction, by derivation index
    pub async fn unused_addresses(&self, wallet_id: &str) -> Result<Vec<String>, DbError> {
        let results = addresses::Entity::find()
            .filter(addresses::Column::WalletId.eq(wallet_id))
            .filter(addresses::Column::Transactions.eq(0))
            .order_by_asc(addresses::Column::DerivationIndex)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(|a| a.address).collect())
    }

    fn to_domain_model(model: addresses::Model) -> AddressInfo {
        AddressInfo {
            address: model.address,
            derivation_index: model.derivation_index,
            wallet_id: model.wallet_id,
            transactions: model.transactions,
        }
    }
}
