use std::fmt::Display;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

pub type UserId = i32;
pub type NoteId = i32;

/// Layout of every timestamp the store and the cache exchange. Fixed-width, so lexicographic order is chronological
/// order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Creation/update time of a record, kept as the store's `YYYY-MM-DD HH:MM:SS` string.
///
/// Comparison is plain string comparison. Values with sub-second differences compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new<S: Into<String>>(ts: S) -> Self {
        Self(ts.into())
    }

    pub fn now() -> Self {
        Self(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(ts: &str) -> Self {
        Self(ts.to_string())
    }
}

impl From<String> for Timestamp {
    fn from(ts: String) -> Self {
        Self(ts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_private_flag(is_private: bool) -> Self {
        if is_private {
            Visibility::Private
        }
        else {
            Visibility::Public
        }
    }

    #[inline]
    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private)
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id:          UserId,
    pub username:    String,
    // Credential material is opaque here; it only passes through.
    #[serde(skip_serializing)]
    pub password:    String,
    #[serde(skip_serializing)]
    pub salt:        String,
    pub last_access: Option<Timestamp>,
}

/// A note row as the persisted store lists it. The owner's name is not part of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteRecord {
    pub id:         NoteId,
    pub user_id:    UserId,
    pub content:    String,
    pub visibility: Visibility,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A cached note.
///
/// `owner_name` is copied from the owning user when the note enters the registry and is never refreshed; renaming a
/// user does not change the name shown on older notes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id:         NoteId,
    pub user_id:    UserId,
    pub content:    String,
    pub visibility: Visibility,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub owner_name: String,
}

impl Note {
    pub fn from_record(record: NoteRecord, owner_name: impl Into<String>) -> Self {
        Self {
            id:         record.id,
            user_id:    record.user_id,
            content:    record.content,
            visibility: record.visibility,
            created_at: record.created_at,
            updated_at: record.updated_at,
            owner_name: owner_name.into(),
        }
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.visibility.is_public()
    }

    /// First line of the content, what listings show as the note title.
    pub fn title(&self) -> &str {
        self.content.lines().next().unwrap_or("")
    }
}

/// What the persisted store needs to create a note.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNote {
    pub user_id:    UserId,
    pub content:    String,
    pub visibility: Visibility,
    pub created_at: Timestamp,
}

impl NewNote {
    pub(crate) fn into_record(self, id: NoteId) -> NoteRecord {
        NoteRecord {
            id,
            user_id: self.user_id,
            content: self.content,
            visibility: self.visibility,
            updated_at: self.created_at.clone(),
            created_at: self.created_at,
        }
    }
}

/// One page of recent public notes.
#[derive(Clone, Debug, Serialize)]
pub struct NotePage {
    pub notes:      Vec<Arc<Note>>,
    /// Zero-based page index.
    pub page:       usize,
    /// Public notes in the whole registry.
    pub total:      usize,
    /// 1-based rank of the first note on the page.
    pub page_start: usize,
    /// 1-based rank of the last note on the page; `page_start - 1` for an empty page.
    pub page_end:   usize,
}

/// A note together with its neighbors in the requester's visibility scope.
#[derive(Clone, Debug, Serialize)]
pub struct NoteContext {
    pub note:  Arc<Note>,
    /// The next note down in newest-first order.
    pub older: Option<Arc<Note>>,
    /// The previous note in newest-first order.
    pub newer: Option<Arc<Note>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub generation:   u64,
    pub users:        usize,
    pub notes:        usize,
    pub public_notes: usize,
}
