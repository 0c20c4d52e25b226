use std::fmt::Debug;
use std::fmt::Display;

use thiserror::Error;

use crate::types::NoteId;
use crate::types::UserId;

#[derive(Debug, Error)]
pub enum CacheError<E>
where
    E: Display + Debug,
{
    /// The persisted store failed. The store's error is passed through untouched.
    #[error("{0}")]
    Store(E),

    #[error("note #{note_id} refers to unknown user #{user_id}")]
    DanglingNote { note_id: NoteId, user_id: UserId },

    #[error("unknown user #{0}")]
    UnknownOwner(UserId),

    #[error("cache setup failed: {0}")]
    Setup(String),
}

impl<E> CacheError<E>
where
    E: Display + Debug,
{
    /// The store error, if that's what this is.
    pub fn store_error(&self) -> Option<&E> {
        match self {
            CacheError::Store(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_store_error(self) -> Result<E, Self> {
        match self {
            CacheError::Store(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Failures that mean a load was aborted.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, CacheError::Store(_) | CacheError::DanglingNote { .. })
    }
}
