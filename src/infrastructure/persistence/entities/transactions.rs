//! SeaORM Entity for the transactions table.
//! Blocks and transactions share the table; `version` tells them apart.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tx_id: String,
    /// Block height, `None` while the transaction sits in mempool
    pub height: Option<i32>,
    pub timestamp: i64,
    pub version: i32,
    pub voided: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
