use async_trait::async_trait;
use std::fmt::Debug;
use std::fmt::Display;

use crate::types::NewNote;
use crate::types::NoteId;
use crate::types::NoteRecord;
use crate::types::User;

/// The persisted store the cache mirrors.
///
/// The cache only reads full listings from it and writes through [`NoteStore::insert_note`]; everything else about
/// the storage is the implementor's business.
#[async_trait]
pub trait NoteStore: Send + Sync + 'static {
    /// Errors are handed to the cache's callers as-is, so keep them meaningful.
    type Error: Display + Debug + Send + Sync + 'static;

    async fn list_users(&self) -> Result<Vec<User>, Self::Error>;
    async fn list_notes(&self) -> Result<Vec<NoteRecord>, Self::Error>;

    /// Commit a new note and return the identifier the store assigned to it. Must fail if the owner doesn't exist.
    async fn insert_note(&self, note: &NewNote) -> Result<NoteId, Self::Error>;
}
