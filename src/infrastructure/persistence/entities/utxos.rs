//! SeaORM Entity for the utxos table.
//! Spent outputs keep their row (with `spent_by` set) until the owning transaction is voided.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "utxos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tx_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub output_index: i32,
    pub token_id: String,
    pub address: String,
    pub value: i64,
    pub authorities: i32,
    pub timelock: Option<i64>,
    pub heightlock: Option<i32>,
    pub locked: bool,
    pub spent_by: Option<String>,
    pub tx_proposal_id: Option<String>,
    pub tx_proposal_index: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
