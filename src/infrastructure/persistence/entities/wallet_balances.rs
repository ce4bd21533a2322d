use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub wallet_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub token_id: String,
    pub unlocked_balance: i64,
    pub locked_balance: i64,
    pub lock_expires: Option<i64>,
    pub unlocked_authorities: i32,
    pub locked_authorities: i32,
    pub transactions: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
