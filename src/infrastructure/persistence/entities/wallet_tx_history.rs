use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_tx_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub wallet_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub tx_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub token_id: String,
    /// Signed net change of the token for this wallet
    pub balance: i64,
    pub timestamp: i64,
    pub voided: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
