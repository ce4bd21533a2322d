use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, EntityTrait, Set};
use std::fmt;

use crate::infrastructure::persistence::entities::tokens;
use crate::infrastructure::persistence::error::DbError;

/// Repository for token metadata
pub struct TokenRepository<'a, C> {
    conn: &'a C,
}

impl<C> fmt::Debug for TokenRepository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRepository").finish_non_exhaustive()
    }
}

impl<'a, C: ConnectionTrait> TokenRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Store a token; an existing token is never modified
    pub async fn insert_if_absent(&self, id: &str, name: &str, symbol: &str) -> Result<(), DbError> {
        let model = tokens::ActiveModel {
            id: Set(id.to_string()),
            name: Set(name.to_string()),
            symbol: Set(symbol.to_string()),
        };

        tokens::Entity::insert(model)
            .on_conflict(OnConflict::column(tokens::Column::Id).do_nothing().to_owned())
            .exec_without_returning(self.conn)
            .await?;

        Ok(())
    }

    /// Name and symbol of a token
    pub async fn find(&self, id: &str) -> Result<Option<(String, String)>, DbError> {
        let result = tokens::Entity::find_by_id(id.to_string())
            .one(self.conn)
            .await?;

        Ok(result.map(|t| (t.name, t.symbol)))
    }
}
