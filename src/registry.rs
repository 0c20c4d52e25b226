//! In-memory mirror of the store's `users` and `notes` tables.

use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::error::CacheError;
use crate::types::CacheStats;
use crate::types::Note;
use crate::types::NoteId;
use crate::types::NoteRecord;
use crate::types::User;
use crate::types::UserId;

/// One generation of the cached tables.
///
/// Never shared without a guard; see [`NoteCache`](crate::NoteCache).
#[derive(Debug, Default, Clone)]
pub struct Registry {
    generation:   u64,
    users:        HashMap<UserId, Arc<User>>,
    notes:        HashMap<NoteId, Arc<Note>>,
    public_count: usize,
    // Ids of the notes that came in through `insert` since this generation was loaded, in arrival order.
    journal:      Vec<NoteId>,
}

impl Registry {
    /// Build a complete generation from full store listings. Nothing here touches a live registry; the result is
    /// meant to be swapped in as a whole.
    pub fn build<E>(generation: u64, users: Vec<User>, records: Vec<NoteRecord>) -> Result<Self, CacheError<E>>
    where
        E: Display + Debug,
    {
        let users: HashMap<UserId, Arc<User>> = users.into_iter().map(|u| (u.id, Arc::new(u))).collect();
        let mut notes = HashMap::with_capacity(records.len());

        for record in records {
            let Some(owner) = users.get(&record.user_id)
            else {
                return Err(CacheError::DanglingNote {
                    note_id: record.id,
                    user_id: record.user_id,
                });
            };

            if let hash_map::Entry::Vacant(slot) = notes.entry(record.id) {
                let owner_name = owner.username.clone();
                slot.insert(Arc::new(Note::from_record(record, owner_name)));
            }
        }

        // The only place where the counter is computed by scanning.
        let public_count = notes.values().filter(|n| n.is_public()).count();

        Ok(Self {
            generation,
            users,
            notes,
            public_count,
            journal: Vec::new(),
        })
    }

    /// Add a note unless one with the same id is already here. Returns `false` for a duplicate, which leaves the
    /// registry unchanged.
    pub fn insert(&mut self, note: Note) -> bool {
        match self.notes.entry(note.id) {
            hash_map::Entry::Occupied(_) => {
                debug!(note_id = note.id, "note is already cached");
                false
            }
            hash_map::Entry::Vacant(slot) => {
                if note.is_public() {
                    self.public_count += 1;
                }
                self.journal.push(note.id);
                slot.insert(Arc::new(note));
                true
            }
        }
    }

    /// Re-apply notes inserted into `previous` after its journal reached `mark`. Used when a reload swaps this
    /// generation in while inserts were landing in the old one.
    ///
    /// Leaves this generation's journal empty: replayed notes are part of it now.
    pub(crate) fn replay_from(&mut self, previous: &Registry, mark: usize) -> usize {
        let mut replayed = 0;
        for id in previous.journal.iter().skip(mark) {
            let Some(note) = previous.notes.get(id)
            else {
                continue;
            };
            if !self.users.contains_key(&note.user_id) {
                warn!(
                    note_id = note.id,
                    user_id = note.user_id,
                    "dropping note inserted during reload: owner is gone"
                );
                continue;
            }
            if self.insert(note.as_ref().clone()) {
                replayed += 1;
            }
        }
        self.journal.clear();
        replayed
    }

    #[inline]
    pub fn note(&self, id: NoteId) -> Option<&Arc<Note>> {
        self.notes.get(&id)
    }

    #[inline]
    pub fn user(&self, id: UserId) -> Option<&Arc<User>> {
        self.users.get(&id)
    }

    pub fn user_by_name(&self, username: &str) -> Option<&Arc<User>> {
        self.users.values().find(|u| u.username == username)
    }

    pub fn notes(&self) -> impl Iterator<Item = &Arc<Note>> {
        self.notes.values()
    }

    #[inline]
    pub fn public_count(&self) -> usize {
        self.public_count
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn journal_len(&self) -> usize {
        self.journal.len()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            generation:   self.generation,
            users:        self.users.len(),
            notes:        self.notes.len(),
            public_notes: self.public_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures;
    use crate::types::Visibility;

    type Error = CacheError<String>;

    fn scanned_public(registry: &Registry) -> usize {
        registry.notes().filter(|n| n.is_public()).count()
    }

    #[test]
    fn build_resolves_owner_names() {
        let registry = Registry::build::<String>(1, fixtures::users(), fixtures::records()).unwrap();
        assert_eq!(registry.generation(), 1);
        assert_eq!(registry.user_count(), 2);
        assert_eq!(registry.note_count(), 4);
        assert_eq!(registry.note(4).unwrap().owner_name, "bob");
        assert_eq!(registry.note(1).unwrap().owner_name, "alice");
        assert_eq!(registry.public_count(), 3);
        assert_eq!(registry.public_count(), scanned_public(&registry));
    }

    #[test]
    fn build_fails_on_unknown_owner() {
        let mut records = fixtures::records();
        records.push(fixtures::record(10, 99, Visibility::Public, "2024-01-05 00:00:00"));

        match Registry::build::<String>(1, fixtures::users(), records) {
            Err(Error::DanglingNote { note_id, user_id }) => {
                assert_eq!(note_id, 10);
                assert_eq!(user_id, 99);
            }
            other => panic!("unexpected build outcome: {other:?}"),
        }
    }

    #[test]
    fn duplicate_insert_is_a_noop() {
        let mut registry = Registry::build::<String>(1, fixtures::users(), fixtures::records()).unwrap();
        let note = fixtures::note(20, 1, Visibility::Public, "2024-02-01 00:00:00");

        assert!(registry.insert(note.clone()));
        let after_first = registry.stats();
        assert!(!registry.insert(note));
        assert_eq!(registry.stats(), after_first);
        assert_eq!(after_first.public_notes, 4);
        assert_eq!(registry.public_count(), scanned_public(&registry));
    }

    #[test]
    fn private_insert_keeps_public_count() {
        let mut registry = Registry::build::<String>(1, fixtures::users(), fixtures::records()).unwrap();
        assert!(registry.insert(fixtures::note(21, 2, Visibility::Private, "2024-02-01 00:00:00")));
        assert_eq!(registry.public_count(), 3);
        assert_eq!(registry.note_count(), 5);
        assert_eq!(registry.public_count(), scanned_public(&registry));
    }

    #[test]
    fn replay_skips_notes_already_fetched() {
        let mut old = Registry::build::<String>(1, fixtures::users(), fixtures::records()).unwrap();
        let mark = old.journal_len();
        old.insert(fixtures::note(30, 1, Visibility::Public, "2024-03-01 00:00:00"));
        old.insert(fixtures::note(31, 2, Visibility::Private, "2024-03-02 00:00:00"));

        // The new listing already saw #30 but not #31.
        let mut records = fixtures::records();
        records.push(fixtures::record(30, 1, Visibility::Public, "2024-03-01 00:00:00"));
        let mut staged = Registry::build::<String>(2, fixtures::users(), records).unwrap();

        assert_eq!(staged.replay_from(&old, mark), 1);
        assert!(staged.note(31).is_some());
        assert_eq!(staged.journal_len(), 0);
        assert_eq!(staged.public_count(), 4);
        assert_eq!(staged.public_count(), scanned_public(&staged));
    }

    #[test]
    fn journal_restarts_with_each_generation() {
        let mut current = Registry::build::<String>(1, fixtures::users(), fixtures::records()).unwrap();
        for id in 40..50 {
            current.insert(fixtures::note(id, 1, Visibility::Public, "2024-04-01 00:00:00"));
        }
        assert_eq!(current.journal_len(), 10);

        for generation in 2..5 {
            let mark = current.journal_len();
            current.insert(fixtures::note(50 + generation as NoteId, 2, Visibility::Public, "2024-05-01 00:00:00"));

            let mut staged = Registry::build::<String>(generation, fixtures::users(), fixtures::records()).unwrap();
            assert_eq!(staged.replay_from(&current, mark), 1);
            assert_eq!(staged.journal_len(), 0);
            current = staged;
        }

        assert_eq!(current.note_count(), 5);
        assert_eq!(current.public_count(), scanned_public(&current));
    }

    #[test]
    fn user_lookup_by_name() {
        let registry = Registry::build::<String>(1, fixtures::users(), vec![]).unwrap();
        assert_eq!(registry.user_by_name("bob").map(|u| u.id), Some(2));
        assert!(registry.user_by_name("mallory").is_none());
    }
}
