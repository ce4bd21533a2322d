use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::fmt;

use crate::domain::models::{ProposalOutput, ProposalStatus};
use crate::infrastructure::persistence::entities::{tx_proposal_outputs, tx_proposals};
use crate::infrastructure::persistence::error::DbError;

/// Stored proposal header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub id: String,
    pub wallet_id: String,
    pub status: ProposalStatus,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Repository for transaction proposals and their outputs
pub struct ProposalRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for ProposalRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProposalRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> ProposalRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        id: &str,
        wallet_id: &str,
        created_at: i64,
        outputs: &[ProposalOutput],
    ) -> Result<(), DbError> {
        let model = tx_proposals::ActiveModel {
            id: Set(id.to_string()),
            wallet_id: Set(wallet_id.to_string()),
            status: Set(ProposalStatus::Open.as_str().to_string()),
            created_at: Set(created_at),
            updated_at: Set(None),
        };
        model.insert(self.conn).await?;

        if outputs.is_empty() {
            return Ok(());
        }

        let models = outputs
            .iter()
            .enumerate()
            .map(|(index, output)| tx_proposal_outputs::ActiveModel {
                tx_proposal_id: Set(id.to_string()),
                output_index: Set(index as i32),
                address: Set(output.address.clone()),
                token_id: Set(output.token.clone()),
                value: Set(output.value),
                timelock: Set(output.timelock),
            });
        tx_proposal_outputs::Entity::insert_many(models)
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    pub async fn find(&self, id: &str) -> Result<Option<ProposalRecord>, DbError> {
        let result = tx_proposals::Entity::find_by_id(id.to_string())
            .one(self.conn)
            .await?;

        result.map(Self::to_domain_model).transpose()
    }

    pub async fn outputs(&self, id: &str) -> Result<Vec<ProposalOutput>, DbError> {
        let results = tx_proposal_outputs::Entity::find()
            .filter(tx_proposal_outputs::Column::TxProposalId.eq(id))
            .order_by_asc(tx_proposal_outputs::Column::OutputIndex)
            .all(self.conn)
            .await?;

        Ok(results
            .into_iter()
            .map(|o| ProposalOutput {
                address: o.address,
                value: o.value,
                token: o.token_id,
                timelock: o.timelock,
            })
            .collect())
    }

    /// Move a proposal out of `from`; returns false when it was not in that status
    pub async fn transition(
        &self,
        id: &str,
        from: ProposalStatus,
        to: ProposalStatus,
        now: i64,
    ) -> Result<bool, DbError> {
        let result = tx_proposals::Entity::update_many()
            .col_expr(tx_proposals::Column::Status, Expr::value(to.as_str()))
            .col_expr(tx_proposals::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(tx_proposals::Column::Id.eq(id))
            .filter(tx_proposals::Column::Status.eq(from.as_str()))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Ids of open proposals created before `created_before`
    pub async fn open_created_before(&self, created_before: i64) -> Result<Vec<String>, DbError> {
        let results = tx_proposals::Entity::find()
            .filter(tx_proposals::Column::Status.eq(ProposalStatus::Open.as_str()))
            .filter(tx_proposals::Column::CreatedAt.lt(created_before))
            .order_by_asc(tx_proposals::Column::CreatedAt)
            .all(self.conn)
            .await?;

        Ok(results.into_iter().map(|p| p.id).collect())
    }

    fn to_domain_model(model: tx_proposals::Model) -> Result<ProposalRecord, DbError> {
        let status = model
            .status
            .parse::<ProposalStatus>()
            .map_err(DbError::QueryError)?;

        Ok(ProposalRecord {
            id: model.id,
            wallet_id: model.wallet_id,
            status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
