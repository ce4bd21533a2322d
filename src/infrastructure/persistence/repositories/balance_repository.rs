//! Repository for address_balances and wallet_balances.
//! Both tables share one layout keyed by (owner, token).

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::fmt;

use crate::domain::models::{Authorities, TokenBalance};
use crate::infrastructure::persistence::entities::{address_balances, wallet_balances};
use crate::infrastructure::persistence::error::DbError;

pub struct BalanceRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for BalanceRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> BalanceRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Balance row of an address, locked for update within the current transaction
    pub async fn address_balance(
        &self,
        address: &str,
        token_id: &str,
    ) -> Result<Option<TokenBalance>, DbError> {
        let result = address_balances::Entity::find()
            .filter(address_balances::Column::Address.eq(address))
            .filter(address_balances::Column::TokenId.eq(token_id))
            .lock_exclusive()
            .one(self.conn)
            .await?;

        Ok(result.map(Self::address_model_to_domain).map(|(_, b)| b))
    }

    /// All balance rows of the given addresses
    pub async fn address_balances(
        &self,
        addresses: &[String],
    ) -> Result<Vec<(String, TokenBalance)>, DbError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let results = address_balances::Entity::find()
            .filter(address_balances::Column::Address.is_in(addresses.iter().cloned()))
            .order_by_asc(address_balances::Column::Address)
            .order_by_asc(address_balances::Column::TokenId)
            .all(self.conn)
            .await?;

        Ok(results
            .into_iter()
            .map(Self::address_model_to_domain)
            .collect())
    }

    pub async fn save_address_balance(
        &self,
        address: &str,
        balance: &TokenBalance,
    ) -> Result<(), DbError> {
        let model = address_balances::ActiveModel {
            address: Set(address.to_string()),
            token_id: Set(balance.token_id.clone()),
            unlocked_balance: Set(balance.unlocked_balance),
            locked_balance: Set(balance.locked_balance),
            lock_expires: Set(balance.lock_expires),
            unlocked_authorities: Set(balance.unlocked_authorities.bits()),
            locked_authorities: Set(balance.locked_authorities.bits()),
            transactions: Set(balance.transactions),
        };

        address_balances::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    address_balances::Column::Address,
                    address_balances::Column::TokenId,
                ])
                .update_columns([
                    address_balances::Column::UnlockedBalance,
                    address_balances::Column::LockedBalance,
                    address_balances::Column::LockExpires,
                    address_balances::Column::UnlockedAuthorities,
                    address_balances::Column::LockedAuthorities,
                    address_balances::Column::Transactions,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    pub async fn delete_address_balances(&self, addresses: &[String]) -> Result<u64, DbError> {
        if addresses.is_empty() {
            return Ok(0);
        }

        let result = address_balances::Entity::delete_many()
            .filter(address_balances::Column::Address.is_in(addresses.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Balance row of a wallet, locked for update within the current transaction.
    /// A missing row locks nothing, so writers hold the wallet row first.
    pub async fn wallet_balance(
        &self,
        wallet_id: &str,
        token_id: &str,
    ) -> Result<Option<TokenBalance>, DbError> {
        let result = wallet_balances::Entity::find()
            .filter(wallet_balances::Column::WalletId.eq(wallet_id))
            .filter(wallet_balances::Column::TokenId.eq(token_id))
            .lock_exclusive()
            .one(self.conn)
            .await?;

        Ok(result.map(Self::wallet_model_to_domain))
    }

    /// Balance rows of a wallet, optionally restricted to one token
    pub async fn wallet_balances(
        &self,
        wallet_id: &str,
        token_id: Option<&str>,
    ) -> Result<Vec<TokenBalance>, DbError> {
        let mut query =
            wallet_balances::Entity::find().filter(wallet_balances::Column::WalletId.eq(wallet_id));
        if let Some(token_id) = token_id {
            query = query.filter(wallet_balances::Column::TokenId.eq(token_id));
        }

        let results = query
            .order_by_asc(wallet_balances::Column::TokenId)
            .all(self.conn)
            .await?;

        Ok(results
            .into_iter()
            .map(Self::wallet_model_to_domain)
            .collect())
    }

    pub async fn save_wallet_balance(
        &self,
        wallet_id: &str,
        balance: &TokenBalance,
    ) -> Result<(), DbError> {
        let model = wallet_balances::ActiveModel {
            wallet_id: Set(wallet_id.to_string()),
            token_id: Set(balance.token_id.clone()),
            unlocked_balance: Set(balance.unlocked_balance),
            locked_balance: Set(balance.locked_balance),
            lock_expires: Set(balance.lock_expires),
            unlocked_authorities: Set(balance.unlocked_authorities.bits()),
            locked_authorities: Set(balance.locked_authorities.bits()),
            transactions: Set(balance.transactions),
        };

        wallet_balances::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    wallet_balances::Column::WalletId,
                    wallet_balances::Column::TokenId,
                ])
                .update_columns([
                    wallet_balances::Column::UnlockedBalance,
                    wallet_balances::Column::LockedBalance,
                    wallet_balances::Column::LockExpires,
                    wallet_balances::Column::UnlockedAuthorities,
                    wallet_balances::Column::LockedAuthorities,
                    wallet_balances::Column::Transactions,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    pub async fn delete_wallet_balances(&self, wallet_id: &str) -> Result<u64, DbError> {
        let result = wallet_balances::Entity::delete_many()
            .filter(wallet_balances::Column::WalletId.eq(wallet_id))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    fn address_model_to_domain(model: address_balances::Model) -> (String, TokenBalance) {
        (
            model.address,
            TokenBalance {
                token_id: model.token_id,
                unlocked_balance: model.unlocked_balance,
                locked_balance: model.locked_balance,
                lock_expires: model.lock_expires,
                unlocked_authorities: Authorities(model.unlocked_authorities),
                locked_authorities: Authorities(model.locked_authorities),
                transactions: model.transactions,
            },
        )
    }

    fn wallet_model_to_domain(model: wallet_balances::Model) -> TokenBalance {
        TokenBalance {
            token_id: model.token_id,
            unlocked_balance: model.unlocked_balance,
            locked_balance: model.locked_balance,
            lock_expires: model.lock_expires,
            unlocked_authorities: Authorities(model.unlocked_authorities),
            locked_authorities: Authorities(model.locked_authorities),
            transactions: model.transactions,
        }
    }
}
