use crate::prelude::*;
use crate::query;
use fieldx::fxstruct;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// The note cache. Holds the whole note corpus of a [`NoteStore`] in memory and answers the service's listing
/// queries from it.
///
/// ```ignore
/// let cache = NoteCache::open(Arc::new(store), 100).await?;
///
/// let page = cache.page(0);
/// let ctx = cache.note_with_context(note_id, session_user);
/// let new_id = cache.create_note(user_id, content, Visibility::Public).await?;
/// ```
///
/// [`NoteCache::open`] is the only way to get one: a cache is never handed out before its first load succeeded.
///
/// All state lives in one [`Registry`] behind a single read/write lock. Queries take the shared side for as long as
/// they run, inserts and reload swaps take the exclusive side. Nothing awaits while holding it.
#[fxstruct(
    sync,
    rc,
    no_new,
    default(off),
    builder(
        vis(pub(crate)),
        doc("Builder object of [`NoteCache`].", "", "See [`NoteCache::builder()`] method."),
        method_doc("Implement builder pattern for [`NoteCache`]."),
    )
)]
pub struct NoteCache<S>
where
    S: NoteStore,
{
    #[fieldx(get(clone), builder(required, into))]
    store: Arc<S>,

    /// Number of notes per page of the public listing.
    #[fieldx(get(copy), default(DEFAULT_PAGE_SIZE))]
    page_size: usize,

    #[fieldx(get(off), builder(off), default(RwLock::new(Registry::default())))]
    registry: RwLock<Registry>,

    // Serializes reloads so that only one staged generation is being built at a time.
    #[fieldx(get(off), builder(off), default(Mutex::new(())))]
    reload_gate: Mutex<()>,
}

impl<S> NoteCache<S>
where
    S: NoteStore,
{
    /// Build a cache over `store` and load it. A cache is only returned if the initial load succeeded.
    pub async fn open(store: Arc<S>, page_size: usize) -> Result<Arc<Self>, CacheError<S::Error>> {
        let cache = Self::builder()
            .store(store)
            .page_size(page_size)
            .build()
            .map_err(|err| CacheError::Setup(err.to_string()))?;

        cache.initialize().await?;

        Ok(cache)
    }

    /// Replace the cached content with a fresh copy of the store.
    ///
    /// The new generation is fetched and validated without blocking readers, then swapped in at once. On failure the
    /// current generation keeps serving and the error is returned.
    #[instrument(level = "debug", skip(self))]
    pub async fn initialize(&self) -> Result<CacheStats, CacheError<S::Error>> {
        let _gate = self.reload_gate.lock().await;
        let started = Instant::now();

        let (generation, mark) = {
            let registry = self.registry.read();
            (registry.generation() + 1, registry.journal_len())
        };

        let mut staged = self.fetch_generation(generation).await.inspect_err(|err| {
            warn!(generation, "cache load failed, keeping generation {}: {err}", generation - 1);
        })?;

        let (stats, replayed) = {
            let mut registry = self.registry.write();
            // Whatever got inserted while we were fetching must survive the swap.
            let replayed = staged.replay_from(&registry, mark);
            *registry = staged;
            (registry.stats(), replayed)
        };

        info!(
            generation = stats.generation,
            users = stats.users,
            notes = stats.notes,
            public_notes = stats.public_notes,
            replayed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache loaded"
        );

        Ok(stats)
    }

    async fn fetch_generation(&self, generation: u64) -> Result<Registry, CacheError<S::Error>> {
        let store = self.store();
        let (users, notes) = tokio::try_join!(store.list_users(), store.list_notes()).map_err(CacheError::Store)?;
        debug!(users = users.len(), notes = notes.len(), "fetched store listings");
        Registry::build(generation, users, notes)
    }

    /// Write a new note to the store and mirror it into the cache. Returns the id the store assigned to it.
    ///
    /// The owner must be known to the current generation. Store failures are returned as
    /// [`CacheError::Store`] with the store's error untouched; the cache is not modified in that case.
    #[instrument(level = "debug", skip(self, content), fields(content_len = content.len()))]
    pub async fn create_note(
        &self,
        owner: UserId,
        content: String,
        visibility: Visibility,
    ) -> Result<NoteId, CacheError<S::Error>> {
        let owner_name = self
            .user(owner)
            .map(|u| u.username.clone())
            .ok_or(CacheError::UnknownOwner(owner))?;

        let new_note = NewNote {
            user_id: owner,
            content,
            visibility,
            created_at: Timestamp::now(),
        };

        let id = self.store.insert_note(&new_note).await.map_err(CacheError::Store)?;

        let note = Note::from_record(new_note.into_record(id), owner_name);
        if !self.registry.write().insert(note) {
            debug!(note_id = id, "store returned an id which is already cached");
        }

        Ok(id)
    }

    /// Page `page` (zero-based) of recent public notes, `None` past the last one.
    #[instrument(level = "trace", skip(self))]
    pub fn page(&self, page: usize) -> Option<NotePage> {
        let registry = self.registry.read();
        let found = query::recent_public(&registry, page, self.page_size());
        if found.is_none() {
            debug!(page, public_notes = registry.public_count(), "page out of range");
        }
        found
    }

    /// First page of recent public notes. Unlike [`page(0)`](Self::page), an empty cache yields an empty page.
    pub fn front_page(&self) -> NotePage {
        let registry = self.registry.read();
        query::front_page(&registry, self.page_size())
    }

    pub fn user_notes(&self, user_id: UserId) -> Vec<Arc<Note>> {
        let registry = self.registry.read();
        query::user_notes(&registry, user_id)
    }

    /// A note with its older and newer neighbors as seen by `requester`. Private notes of other users are reported
    /// exactly like missing ones.
    #[instrument(level = "trace", skip(self))]
    pub fn note_with_context(&self, note_id: NoteId, requester: Option<UserId>) -> Option<NoteContext> {
        let registry = self.registry.read();
        query::note_with_context(&registry, note_id, requester)
    }

    /// Raw lookup, no visibility check.
    pub fn note(&self, note_id: NoteId) -> Option<Arc<Note>> {
        self.registry.read().note(note_id).cloned()
    }

    pub fn user(&self, user_id: UserId) -> Option<Arc<User>> {
        self.registry.read().user(user_id).cloned()
    }

    pub fn user_by_name(&self, username: &str) -> Option<Arc<User>> {
        self.registry.read().user_by_name(username).cloned()
    }

    pub fn public_count(&self) -> usize {
        self.registry.read().public_count()
    }

    pub fn generation(&self) -> u64 {
        self.registry.read().generation()
    }

    pub fn stats(&self) -> CacheStats {
        self.registry.read().stats()
    }

    /// Run `f` over the current generation while holding the shared lock. Keep it short: inserts and reloads wait
    /// for it.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&*self.registry.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures;
    use crate::test::MemoryStore;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    async fn open_cache(page_size: usize) -> (Arc<MemoryStore>, Arc<NoteCache<MemoryStore>>) {
        let store = Arc::new(MemoryStore::seeded());
        let cache = NoteCache::open(Arc::clone(&store), page_size)
            .await
            .expect("initial load");
        (store, cache)
    }

    fn assert_counter(cache: &NoteCache<MemoryStore>) {
        let scanned = cache.with_registry(|r| r.notes().filter(|n| n.is_public()).count());
        assert_eq!(cache.public_count(), scanned);
    }

    #[tokio::test]
    async fn initial_load_mirrors_store() {
        let (store, cache) = open_cache(10).await;
        let stats = cache.stats();

        assert_eq!(stats.generation, 1);
        assert_eq!(stats.users, store.users().len());
        assert_eq!(stats.notes, store.records().len());
        assert_eq!(stats.public_notes, 3);
        assert_counter(&cache);

        for record in store.records() {
            let note = cache.note(record.id).expect("note is cached");
            assert_eq!(note.content, record.content);
            assert_eq!(note.visibility, record.visibility);
        }
    }

    #[tokio::test]
    async fn initial_load_failure_is_reported() {
        let store = Arc::new(MemoryStore::seeded());
        store.fail_listing(true);

        let err = match NoteCache::open(store, 10).await {
            Ok(_) => panic!("cache opened over a failing store"),
            Err(err) => err,
        };
        assert!(err.is_load_failure());
        assert_eq!(err.store_error().map(String::as_str), Some("listing failed"));
    }

    #[tokio::test]
    async fn dangling_note_fails_load() {
        let store = Arc::new(MemoryStore::seeded());
        store.push_record(fixtures::record(9, 77, Visibility::Public, "2024-01-09 00:00:00"));

        match NoteCache::open(store, 10).await {
            Err(CacheError::DanglingNote { note_id: 9, user_id: 77 }) => (),
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("cache opened with a dangling note"),
        }
    }

    #[tokio::test]
    async fn example_scenario() {
        let (_store, cache) = open_cache(3).await;

        let page = cache.page(0).unwrap();
        assert_eq!(page.notes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(page.total, 3);
        assert!(cache.page(1).is_none());

        let ctx = cache.note_with_context(2, None).unwrap();
        assert_eq!(ctx.older.map(|n| n.id), Some(1));
        assert_eq!(ctx.newer.map(|n| n.id), Some(3));

        let ctx = cache.note_with_context(4, Some(2)).unwrap();
        assert_eq!(ctx.note.owner_name, "bob");
        assert_eq!(ctx.older.map(|n| n.id), Some(3));
        assert!(ctx.newer.is_none());

        assert!(cache.note_with_context(4, None).is_none());
        assert!(cache.note_with_context(4, Some(1)).is_none());
    }

    #[tokio::test]
    async fn create_note_writes_through() {
        let (store, cache) = open_cache(10).await;

        let id = cache
            .create_note(1, "hello\nworld".to_string(), Visibility::Public)
            .await
            .unwrap();

        assert!(store.records().iter().any(|r| r.id == id));
        let note = cache.note(id).unwrap();
        assert_eq!(note.owner_name, "alice");
        assert_eq!(note.title(), "hello");
        assert_eq!(note.created_at, note.updated_at);
        assert_eq!(cache.public_count(), 4);
        assert_eq!(cache.front_page().notes[0].id, id);
        assert_counter(&cache);

        let private_id = cache
            .create_note(2, "secret".to_string(), Visibility::Private)
            .await
            .unwrap();
        assert_eq!(cache.public_count(), 4);
        assert!(cache.note_with_context(private_id, None).is_none());
        assert!(cache.note_with_context(private_id, Some(2)).is_some());
        assert_eq!(cache.user_notes(2)[0].id, private_id);
        assert_counter(&cache);
    }

    #[tokio::test]
    async fn failed_insert_leaves_cache_untouched() {
        let (store, cache) = open_cache(10).await;
        let before = cache.stats();
        store.fail_insert(true);

        let err = cache
            .create_note(1, "lost".to_string(), Visibility::Public)
            .await
            .unwrap_err();
        assert_eq!(err.into_store_error().ok().as_deref(), Some("insert failed"));
        assert_eq!(cache.stats(), before);
    }

    #[tokio::test]
    async fn unknown_owner_is_rejected_before_store() {
        let (store, cache) = open_cache(10).await;
        let records_before = store.records().len();

        match cache.create_note(99, "who?".to_string(), Visibility::Public).await {
            Err(CacheError::UnknownOwner(99)) => (),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.records().len(), records_before);
    }

    #[tokio::test]
    async fn reset_picks_up_store_changes() {
        let (store, cache) = open_cache(10).await;

        store.push_record(fixtures::record(50, 2, Visibility::Public, "2024-05-01 00:00:00"));
        store.remove_record(1);

        let stats = cache.initialize().await.unwrap();
        assert_eq!(stats.generation, 2);
        assert!(cache.note(1).is_none());
        assert!(cache.note(50).is_some());
        assert_eq!(stats.notes, store.records().len());
        assert_eq!(cache.public_count(), 3);
        assert_counter(&cache);
    }

    #[tokio::test]
    async fn failed_reset_keeps_previous_generation() {
        let (store, cache) = open_cache(10).await;
        let before = cache.stats();

        store.push_record(fixtures::record(60, 1, Visibility::Public, "2024-06-01 00:00:00"));
        store.fail_listing(true);

        assert!(cache.initialize().await.is_err());
        assert_eq!(cache.stats(), before);
        assert!(cache.note(60).is_none());
        assert_eq!(cache.page(0).unwrap().notes.len(), 3);

        store.fail_listing(false);
        let stats = cache.initialize().await.unwrap();
        assert_eq!(stats.generation, before.generation + 1);
        assert!(cache.note(60).is_some());
    }

    #[tokio::test]
    async fn insert_during_reload_survives_swap() {
        let (store, cache) = open_cache(10).await;
        let (reached, resume) = store.pause_next_listing();

        let reload = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.initialize().await }
        });

        // The reload now holds a listing taken before the insert below.
        reached.notified().await;
        let id = cache
            .create_note(1, "racing the reset".to_string(), Visibility::Public)
            .await
            .unwrap();
        resume.notify_one();

        let stats = reload.await.unwrap().unwrap();
        assert_eq!(stats.generation, 2);
        assert!(cache.note(id).is_some());
        assert_eq!(cache.public_count(), 4);
        assert_counter(&cache);
        assert_eq!(cache.with_registry(|r| r.journal_len()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_and_writers() {
        let (_store, cache) = open_cache(5).await;
        let writers_done = Arc::new(AtomicBool::new(false));
        let mut readers = tokio::task::JoinSet::new();
        let mut writers = tokio::task::JoinSet::new();

        for _ in 0..3 {
            let cache = Arc::clone(&cache);
            let writers_done = Arc::clone(&writers_done);
            readers.spawn(async move {
                let mut checks = 0usize;
                while !writers_done.load(Ordering::Acquire) || checks == 0 {
                    assert!(cache.with_registry(|r| r.public_count() == r.notes().filter(|n| n.is_public()).count()));
                    let page = cache.front_page();
                    assert!(page.notes.len() <= 5);
                    assert!(page.notes.iter().all(|n| n.is_public()));
                    checks += 1;
                    tokio::task::yield_now().await;
                }
                checks
            });
        }

        for i in 0..64 {
            let cache = Arc::clone(&cache);
            writers.spawn(async move {
                let visibility = if i % 2 == 0 { Visibility::Public } else { Visibility::Private };
                let owner = 1 + i % 2;
                cache.create_note(owner, format!("note {i}"), visibility).await.unwrap();
            });
        }

        while let Some(res) = writers.join_next().await {
            res.unwrap();
        }
        writers_done.store(true, Ordering::Release);

        while let Some(res) = readers.join_next().await {
            assert!(res.unwrap() > 0);
        }

        assert_eq!(cache.stats().notes, 68);
        assert_eq!(cache.public_count(), 35);
        assert_counter(&cache);
    }

    #[tokio::test]
    async fn user_lookups() {
        let (_store, cache) = open_cache(10).await;
        assert_eq!(cache.user_by_name("alice").map(|u| u.id), Some(1));
        assert_eq!(cache.user(2).map(|u| u.username.clone()).as_deref(), Some("bob"));
        assert!(cache.user(3).is_none());
    }
}
