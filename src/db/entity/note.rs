use sea_orm::entity::prelude::*;

use crate::types::NoteRecord;
use crate::types::Timestamp;
use crate::types::Visibility;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "notes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id:         i32,
    pub user_id:    i32,
    #[sea_orm(column_type = "Text")]
    pub content:    String,
    pub is_private: bool,
    /// `YYYY-MM-DD HH:MM:SS`, compared as a string.
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for NoteRecord {
    fn from(row: Model) -> Self {
        Self {
            id:         row.id,
            user_id:    row.user_id,
            content:    row.content,
            visibility: Visibility::from_private_flag(row.is_private),
            created_at: Timestamp::from(row.created_at),
            updated_at: Timestamp::from(row.updated_at),
        }
    }
}
