//! Read-side algorithms over a single registry generation.
//!
//! Every function here expects the caller to hold the registry guard for the duration of the call. Results are
//! `Arc` snapshots and stay valid after the guard is released.
//!
//! All listings are ordered newest first: by creation timestamp descending, then by note id descending. The id
//! only breaks timestamp ties; callers should not read more into the order of equal-timestamp notes.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::registry::Registry;
use crate::types::Note;
use crate::types::NoteContext;
use crate::types::NoteId;
use crate::types::NotePage;
use crate::types::UserId;

#[inline]
pub fn newest_first(a: &Note, b: &Note) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

fn sorted(mut notes: Vec<Arc<Note>>) -> Vec<Arc<Note>> {
    notes.sort_unstable_by(|a, b| newest_first(a, b));
    notes
}

fn public_notes(registry: &Registry) -> Vec<Arc<Note>> {
    sorted(registry.notes().filter(|n| n.is_public()).cloned().collect())
}

fn page_of(notes: Vec<Arc<Note>>, page: usize, page_size: usize, total: usize) -> NotePage {
    let start = page * page_size;
    let notes: Vec<_> = notes.into_iter().skip(start).take(page_size).collect();
    NotePage {
        page,
        total,
        page_start: start + 1,
        page_end: start + notes.len(),
        notes,
    }
}

/// Page `page` of public notes. `None` when the page starts past the last public note, which includes page 0 of an
/// empty registry.
pub fn recent_public(registry: &Registry, page: usize, page_size: usize) -> Option<NotePage> {
    let page_size = page_size.max(1);
    let total = registry.public_count();
    let start = page.checked_mul(page_size)?;

    if start >= total {
        return None;
    }

    Some(page_of(public_notes(registry), page, page_size, total))
}

/// Page 0 of public notes, empty if there are none.
pub fn front_page(registry: &Registry, page_size: usize) -> NotePage {
    page_of(public_notes(registry), 0, page_size.max(1), registry.public_count())
}

/// Every note of `user_id`, private ones included. Not paged.
pub fn user_notes(registry: &Registry, user_id: UserId) -> Vec<Arc<Note>> {
    sorted(registry.notes().filter(|n| n.user_id == user_id).cloned().collect())
}

/// Whether `requester` may see `note`. Private notes are only visible to their owners.
#[inline]
pub fn is_visible_to(note: &Note, requester: Option<UserId>) -> bool {
    note.is_public() || requester == Some(note.user_id)
}

/// The note `note_id` with its neighbors, or `None` if it doesn't exist or `requester` may not see it. Both cases
/// look the same to the caller.
///
/// Neighbors are taken from the public notes, plus the owner's private notes when the requester is the owner.
pub fn note_with_context(registry: &Registry, note_id: NoteId, requester: Option<UserId>) -> Option<NoteContext> {
    let note = registry.note(note_id)?;

    if !is_visible_to(note, requester) {
        return None;
    }

    let owner_view = requester == Some(note.user_id);
    let scope = sorted(
        registry
            .notes()
            .filter(|n| n.is_public() || (owner_view && n.user_id == note.user_id))
            .cloned()
            .collect(),
    );

    // The note is always in its own scope.
    let pos = scope.iter().position(|n| n.id == note_id)?;

    Some(NoteContext {
        note:  Arc::clone(note),
        newer: pos.checked_sub(1).map(|i| Arc::clone(&scope[i])),
        older: scope.get(pos + 1).cloned(),
    })
}
