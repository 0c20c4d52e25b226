use sea_orm::entity::prelude::*;

use crate::types::Timestamp;
use crate::types::User;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id:          i32,
    #[sea_orm(unique, indexed)]
    pub username:    String,
    /// Hex digest of salt + password.
    pub password:    String,
    pub salt:        String,
    pub last_access: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::note::Entity")]
    Note,
}

impl Related<super::note::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Note.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for User {
    fn from(row: Model) -> Self {
        Self {
            id:          row.id,
            username:    row.username,
            password:    row.password,
            salt:        row.salt,
            last_access: row.last_access.map(Timestamp::from),
        }
    }
}
