use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::DbErr;
use sea_orm::EntityTrait;
use sea_orm::QueryOrder;
use sea_orm_migration::MigratorTrait;
use tracing::instrument;

use super::driver::DatabaseDriver;
use super::entity::note;
use super::entity::user;
use super::entity::Notes;
use super::entity::Users;
use super::migrations::Migrator;
use crate::traits::NoteStore;
use crate::types::NewNote;
use crate::types::NoteId;
use crate::types::NoteRecord;
use crate::types::User;
use crate::types::UserId;

/// [`NoteStore`] over the `users` and `notes` tables of any [`DatabaseDriver`].
pub struct DbStore<D>
where
    D: DatabaseDriver,
{
    driver: Arc<D>,
}

impl<D> DbStore<D>
where
    D: DatabaseDriver,
{
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> Arc<D> {
        Arc::clone(&self.driver)
    }

    /// Bring the schema up to date.
    pub async fn migrate(&self) -> Result<(), DbErr> {
        self.driver.configure().await?;
        Migrator::up(&self.driver.connection(), None).await
    }

    /// Register a user. Credentials are stored as given.
    #[instrument(level = "debug", skip(self, password, salt))]
    pub async fn create_user(&self, username: &str, password: &str, salt: &str) -> Result<UserId, DbErr> {
        let row = user::ActiveModel {
            username: Set(username.to_string()),
            password: Set(password.to_string()),
            salt: Set(salt.to_string()),
            last_access: Set(None),
            ..Default::default()
        };
        Ok(Users::insert(row).exec(&self.driver.connection()).await?.last_insert_id)
    }
}

impl<D> Debug for DbStore<D>
where
    D: DatabaseDriver,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DbStore({})", self.driver.name())
    }
}

#[async_trait]
impl<D> NoteStore for DbStore<D>
where
    D: DatabaseDriver,
{
    type Error = DbErr;

    async fn list_users(&self) -> Result<Vec<User>, Self::Error> {
        let rows = Users::find().all(&self.driver.connection()).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_notes(&self) -> Result<Vec<NoteRecord>, Self::Error> {
        let rows = Notes::find()
            .order_by_asc(note::Column::Id)
            .all(&self.driver.connection())
            .await?;
        Ok(rows.into_iter().map(NoteRecord::from).collect())
    }

    #[instrument(level = "trace", skip(self, note), fields(user_id = note.user_id))]
    async fn insert_note(&self, note: &NewNote) -> Result<NoteId, Self::Error> {
        let row = note::ActiveModel {
            user_id: Set(note.user_id),
            content: Set(note.content.clone()),
            is_private: Set(note.visibility.is_private()),
            created_at: Set(note.created_at.to_string()),
            updated_at: Set(note.created_at.to_string()),
            ..Default::default()
        };
        Ok(Notes::insert(row).exec(&self.driver.connection()).await?.last_insert_id)
    }
}
