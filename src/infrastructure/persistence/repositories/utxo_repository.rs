use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use std::fmt;

use crate::domain::models::{Authorities, Utxo, UtxoFilter, UtxoRef};
use crate::infrastructure::persistence::entities::{addresses, utxos};
use crate::infrastructure::persistence::error::DbError;

const INSERT_CHUNK: usize = 500;
const ALL_AUTHORITIES: i32 = 0b11;

/// Repository for the UTXO store.
/// Handles creation, spending, lock bookkeeping and proposal reservations.
pub struct UtxoRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for UtxoRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtxoRepository").finish_non_exhaustive()
    }
}

/// Result of marking inputs as spent
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpendOutcome {
    /// Inputs with no stored output (created before indexing started)
    pub missing: Vec<UtxoRef>,
    /// Inputs already spent by another transaction, with that transaction
    pub conflicts: Vec<(UtxoRef, String)>,
}

fn matching(refs: &[UtxoRef]) -> Condition {
    refs.iter().fold(Condition::any(), |cond, r| {
        cond.add(
            Condition::all()
                .add(utxos::Column::TxId.eq(r.tx_id.clone()))
                .add(utxos::Column::OutputIndex.eq(r.index)),
        )
    })
}

impl<'a, C: ConnectionTrait> UtxoRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert new outputs; outputs already present are left untouched
    pub async fn insert(&self, new_utxos: &[Utxo]) -> Result<usize, DbError> {
        if new_utxos.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        for chunk in new_utxos.chunks(INSERT_CHUNK) {
            let models = chunk.iter().map(|u| utxos::ActiveModel {
                tx_id: Set(u.tx_id.clone()),
                output_index: Set(u.index),
                token_id: Set(u.token_id.clone()),
                address: Set(u.address.clone()),
                value: Set(u.value),
                authorities: Set(u.authorities.bits()),
                timelock: Set(u.timelock),
                heightlock: Set(u.heightlock),
                locked: Set(u.locked),
                spent_by: Set(None),
                tx_proposal_id: Set(None),
                tx_proposal_index: Set(None),
            });

            let inserted = utxos::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([utxos::Column::TxId, utxos::Column::OutputIndex])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(self.conn)
                .await?;
            total_inserted += inserted as usize;
        }

        Ok(total_inserted)
    }

    /// Fetch stored outputs, spent or not
    pub async fn get(&self, refs: &[UtxoRef]) -> Result<Vec<Utxo>, DbError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let results = utxos::Entity::find()
            .filter(matching(refs))
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Inputs whose outputs are still flagged locked.
    /// Happens when a spend arrives before the sweep that would have unlocked them.
    pub async fn locked_from_inputs(&self, refs: &[UtxoRef]) -> Result<Vec<Utxo>, DbError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let results = utxos::Entity::find()
            .filter(matching(refs))
            .filter(utxos::Column::Locked.eq(true))
            .filter(utxos::Column::SpentBy.is_null())
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Mark outputs as spent by `by_tx`. Never overwrites a spend by another transaction.
    pub async fn mark_spent(&self, refs: &[UtxoRef], by_tx: &str) -> Result<SpendOutcome, DbError> {
        let mut outcome = SpendOutcome::default();

        for r in refs {
            let updated = utxos::Entity::update_many()
                .col_expr(utxos::Column::SpentBy, Expr::value(Some(by_tx.to_string())))
                .filter(utxos::Column::TxId.eq(r.tx_id.clone()))
                .filter(utxos::Column::OutputIndex.eq(r.index))
                .filter(utxos::Column::SpentBy.is_null())
                .exec(self.conn)
                .await?;

            if updated.rows_affected > 0 {
                continue;
            }

            let existing = utxos::Entity::find_by_id((r.tx_id.clone(), r.index))
                .one(self.conn)
                .await?;
            match existing.and_then(|u| u.spent_by) {
                None => outcome.missing.push(r.clone()),
                Some(spender) if spender == by_tx => {}
                Some(spender) => outcome.conflicts.push((r.clone(), spender)),
            }
        }

        Ok(outcome)
    }

    /// Clear the spend mark of outputs consumed by the given transactions
    pub async fn unspend_by(&self, tx_ids: &[String]) -> Result<u64, DbError> {
        if tx_ids.is_empty() {
            return Ok(0);
        }

        let result = utxos::Entity::update_many()
            .col_expr(utxos::Column::SpentBy, Expr::value(Option::<String>::None))
            .filter(utxos::Column::SpentBy.is_in(tx_ids.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Flag outputs as unlocked, optionally dropping their heightlock
    pub async fn unlock(&self, refs: &[UtxoRef], clear_heightlock: bool) -> Result<u64, DbError> {
        if refs.is_empty() {
            return Ok(0);
        }

        let mut update = utxos::Entity::update_many()
            .col_expr(utxos::Column::Locked, Expr::value(false))
            .filter(matching(refs));
        if clear_heightlock {
            update = update.col_expr(utxos::Column::Heightlock, Expr::value(Option::<i32>::None));
        }

        let result = update.exec(self.conn).await?;
        Ok(result.rows_affected)
    }

    /// Locked outputs whose heightlock has been reached and whose timelock (if any) expired
    pub async fn find_maturing(&self, now: i64, height: i32) -> Result<Vec<Utxo>, DbError> {
        let results = utxos::Entity::find()
            .filter(utxos::Column::Locked.eq(true))
            .filter(utxos::Column::Heightlock.lte(height))
            .filter(
                Condition::any()
                    .add(utxos::Column::Timelock.is_null())
                    .add(utxos::Column::Timelock.lte(now)),
            )
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Locked outputs whose timelock expired and that are not held back by a heightlock
    pub async fn find_expired_timelocks(
        &self,
        now: i64,
        best_height: Option<i32>,
    ) -> Result<Vec<Utxo>, DbError> {
        let mut height_condition = Condition::any().add(utxos::Column::Heightlock.is_null());
        if let Some(height) = best_height {
            height_condition = height_condition.add(utxos::Column::Heightlock.lte(height));
        }

        let results = utxos::Entity::find()
            .filter(utxos::Column::Locked.eq(true))
            .filter(utxos::Column::Timelock.lte(now))
            .filter(height_condition)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Outputs created by the given transactions
    pub async fn owned_by(&self, tx_ids: &[String]) -> Result<Vec<Utxo>, DbError> {
        if tx_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = utxos::Entity::find()
            .filter(utxos::Column::TxId.is_in(tx_ids.iter().cloned()))
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Outputs consumed by the given transactions
    pub async fn spent_by(&self, tx_ids: &[String]) -> Result<Vec<Utxo>, DbError> {
        if tx_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = utxos::Entity::find()
            .filter(utxos::Column::SpentBy.is_in(tx_ids.iter().cloned()))
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Hard delete the outputs of voided transactions
    pub async fn delete_owned_by(&self, tx_ids: &[String]) -> Result<u64, DbError> {
        if tx_ids.is_empty() {
            return Ok(0);
        }

        let result = utxos::Entity::delete_many()
            .filter(utxos::Column::TxId.is_in(tx_ids.iter().cloned()))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Unspent outputs of the given addresses, locked or not
    pub async fn unspent_for_addresses(&self, addresses: &[String]) -> Result<Vec<Utxo>, DbError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let results = utxos::Entity::find()
            .filter(utxos::Column::Address.is_in(addresses.iter().cloned()))
            .filter(utxos::Column::SpentBy.is_null())
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Unlocked, unreserved, non-authority outputs of a wallet, biggest first
    pub async fn select_spendable(
        &self,
        wallet_id: &str,
        token_id: &str,
    ) -> Result<Vec<Utxo>, DbError> {
        let wallet_addresses = Query::select()
            .column(addresses::Column::Address)
            .from(addresses::Entity)
            .and_where(addresses::Column::WalletId.eq(wallet_id))
            .to_owned();

        let results = utxos::Entity::find()
            .filter(utxos::Column::Address.in_subquery(wallet_addresses))
            .filter(utxos::Column::TokenId.eq(token_id))
            .filter(utxos::Column::Authorities.eq(0))
            .filter(utxos::Column::Locked.eq(false))
            .filter(utxos::Column::SpentBy.is_null())
            .filter(utxos::Column::TxProposalId.is_null())
            .order_by_desc(utxos::Column::Value)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Reserve outputs for a proposal, assigning ordinals in the given order.
    /// Returns the outputs that could not be reserved; the caller must roll back when any are returned.
    pub async fn reserve(
        &self,
        proposal_id: &str,
        refs: &[UtxoRef],
    ) -> Result<Vec<UtxoRef>, DbError> {
        let mut conflicts = Vec::new();

        for (ordinal, r) in refs.iter().enumerate() {
            let updated = utxos::Entity::update_many()
                .col_expr(
                    utxos::Column::TxProposalId,
                    Expr::value(Some(proposal_id.to_string())),
                )
                .col_expr(
                    utxos::Column::TxProposalIndex,
                    Expr::value(Some(ordinal as i32)),
                )
                .filter(utxos::Column::TxId.eq(r.tx_id.clone()))
                .filter(utxos::Column::OutputIndex.eq(r.index))
                .filter(utxos::Column::SpentBy.is_null())
                .filter(utxos::Column::TxProposalId.is_null())
                .exec(self.conn)
                .await?;

            if updated.rows_affected == 0 {
                conflicts.push(r.clone());
            }
        }

        Ok(conflicts)
    }

    /// Drop the reservations held by a proposal
    pub async fn release(&self, proposal_id: &str) -> Result<u64, DbError> {
        let result = utxos::Entity::update_many()
            .col_expr(utxos::Column::TxProposalId, Expr::value(Option::<String>::None))
            .col_expr(utxos::Column::TxProposalIndex, Expr::value(Option::<i32>::None))
            .filter(utxos::Column::TxProposalId.eq(proposal_id))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Inputs reserved by a proposal, in ordinal order
    pub async fn proposal_inputs(&self, proposal_id: &str) -> Result<Vec<Utxo>, DbError> {
        let results = utxos::Entity::find()
            .filter(utxos::Column::TxProposalId.eq(proposal_id))
            .order_by_asc(utxos::Column::TxProposalIndex)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    /// Unspent outputs of a set of addresses matching the filter, biggest first
    pub async fn filter(&self, filter: &UtxoFilter) -> Result<Vec<Utxo>, DbError> {
        let mut query = utxos::Entity::find()
            .filter(utxos::Column::Address.is_in(filter.addresses.iter().cloned()))
            .filter(utxos::Column::TokenId.eq(filter.token_id.clone()))
            .filter(utxos::Column::SpentBy.is_null());

        if filter.ignore_locked {
            query = query.filter(utxos::Column::Locked.eq(false));
        }
        match filter.authority {
            Some(bits) if !bits.is_empty() => {
                let holding: Vec<i32> = (1..=ALL_AUTHORITIES)
                    .filter(|mask| mask & bits.bits() == bits.bits())
                    .collect();
                query = query.filter(utxos::Column::Authorities.is_in(holding));
            }
            _ => {
                query = query.filter(utxos::Column::Authorities.eq(0));
            }
        }
        if let Some(min) = filter.bigger_than {
            query = query.filter(utxos::Column::Value.gt(min));
        }
        if let Some(max) = filter.smaller_than {
            query = query.filter(utxos::Column::Value.lt(max));
        }

        query = query.order_by_desc(utxos::Column::Value);
        if let Some(limit) = filter.max_utxos {
            query = query.limit(limit);
        }

        let results = query.all(self.conn).await?;
        Ok(results.into_iter().map(Self::to_domain_model).collect())
    }

    fn to_domain_model(model: utxos::Model) -> Utxo {
        Utxo {
            tx_id: model.tx_id,
            index: model.output_index,
            token_id: model.token_id,
            address: model.address,
            value: model.value,
            authorities: Authorities(model.authorities),
            timelock: model.timelock,
            heightlock: model.heightlock,
            locked: model.locked,
            spent_by: model.spent_by,
            tx_proposal_id: model.tx_proposal_id,
            tx_proposal_index: model.tx_proposal_index,
        }
    }
}
