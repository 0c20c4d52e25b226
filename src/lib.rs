//! # note-cache
//!
//! In-process mirror of a note/user store for a small note sharing service.
//!
//! The service keeps every note in memory for its whole lifetime and answers its read traffic from there: pages of
//! recent public notes, a user's own notes, and a single note with its older/newer neighbors within what the
//! requester is allowed to see. The persisted store is only read in full, at startup and on an administrative reset,
//! and written through when a note is created.
//!
//! # The Basics
//!
//! - The store is anything implementing [`NoteStore`]: list all users, list all notes, insert a note. A SeaORM
//!   implementation lives in the `db` module (enable one of the `sqlite`, `pg`, or `mysql` features).
//! - [`NoteCache`] owns one [`Registry`](registry::Registry) generation at a time behind a single read/write lock.
//!   Reads share the lock; inserts and reload swaps take it exclusively.
//! - Nothing is ever evicted, updated in place, or deleted by the cache. A reset replaces the whole generation, and
//!   only if the new one loaded completely.
//! - Private notes of other users are indistinguishable from missing ones.
//!
//! ```ignore
//! let cache = NoteCache::open(Arc::new(store), 100).await?;
//!
//! match cache.note_with_context(note_id, session_user) {
//!     Some(ctx) => render(ctx.note, ctx.older, ctx.newer),
//!     None => not_found(),
//! }
//! ```

pub mod cache;
#[cfg(feature = "cli")]
pub mod config;
#[cfg(feature = "db")]
pub mod db;
pub mod error;
pub mod query;
pub mod registry;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::NoteCache;
#[doc(inline)]
pub use error::CacheError;
#[doc(inline)]
pub use traits::NoteStore;

pub mod prelude {
    pub use crate::cache::NoteCache;
    pub use crate::error::CacheError;
    pub use crate::registry::Registry;
    pub use crate::traits::NoteStore;
    pub use crate::types::*;
}
