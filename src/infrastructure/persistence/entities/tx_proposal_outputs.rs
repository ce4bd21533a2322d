use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tx_proposal_outputs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tx_proposal_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub output_index: i32,
    pub address: String,
    pub token_id: String,
    pub value: i64,
    pub timelock: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
