//! Request cache with tag invalidation and in-flight de-duplication.
//!
//! Entries are keyed by operation + serialized arguments and hold the last
//! successful value, the last error, a tag set and a retention deadline.
//! Uses `DashMap` so readers never contend on a global lock; no map guard is
//! ever held across an `.await` or while subscriber callbacks run.
//!
//! Loads run in spawned tasks: a load finishes and is cached even when every
//! caller waiting on it has gone away.

use common::Error;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Type-erased cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

type SharedLoad = Shared<BoxFuture<'static, Result<CacheValue, Error>>>;
type Callback = Arc<dyn Fn(&CacheKey, &CacheEvent) + Send + Sync>;
type TagFn = Arc<dyn Fn(&CacheValue) -> Vec<Tag> + Send + Sync>;

/// Retention used for entries created by `subscribe` before any fetch.
const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

// ── Keys and tags ─────────────────────────────────────────────────────

/// Operation name plus serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: String,
    args: String,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: args.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &str {
        &self.args
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.operation)
        } else {
            write!(f, "{}({})", self.operation, self.args)
        }
    }
}

/// Label for bulk invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::new(value)
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Tag::new(value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Retention window and tags for a fetched or written value.
#[derive(Clone)]
pub struct FetchOptions {
    /// How long the entry survives once nobody is subscribed.
    pub ttl: Duration,
    pub tags: Vec<Tag>,
    derived: Option<TagFn>,
}

impl FetchOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tags: Vec::new(),
            derived: None,
        }
    }

    /// Tags computed from the stored value, added to the fixed tags each
    /// time the entry settles successfully.
    pub fn tag_with<T, F>(mut self, derive: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> Vec<Tag> + Send + Sync + 'static,
    {
        self.derived = Some(Arc::new(move |value: &CacheValue| {
            value.downcast_ref::<T>().map(&derive).unwrap_or_default()
        }));
        self
    }

    fn tags_for(&self, value: &CacheValue) -> HashSet<Tag> {
        let mut tags: HashSet<Tag> = self.tags.iter().cloned().collect();
        if let Some(derive) = &self.derived {
            tags.extend(derive(value));
        }
        tags
    }

    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Tag>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("ttl", &self.ttl)
            .field("tags", &self.tags)
            .field("derived", &self.derived.is_some())
            .finish()
    }
}

/// What a subscriber is told about its key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A load or write stored a new value.
    Updated,
    /// A load failed; any previous value is still held.
    Failed(Error),
    /// A tag invalidation marked the entry stale.
    Invalidated,
    /// The entry was dropped from the store.
    Removed,
}

/// Observable status of one key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    Missing,
    /// A load is running; `refreshing` when an older value is still served.
    Loading { refreshing: bool },
    Fresh,
    Stale,
    Failed(Error),
}

// ── Entries ───────────────────────────────────────────────────────────

struct Entry {
    value: Option<CacheValue>,
    error: Option<Error>,
    fresh: bool,
    tags: HashSet<Tag>,
    retention: Duration,
    expires_at: Option<Instant>,
    inflight: Option<SharedLoad>,
    subscribers: HashMap<u64, Callback>,
}

impl Entry {
    fn new(retention: Duration) -> Self {
        Self {
            value: None,
            error: None,
            fresh: false,
            tags: HashSet::new(),
            retention,
            expires_at: Some(Instant::now() + retention),
            inflight: None,
            subscribers: HashMap::new(),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.subscribers.is_empty() && self.expires_at.is_some_and(|at| at <= now)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.fresh && self.value.is_some() && !self.is_expired(now)
    }

    /// Restart the retention countdown for an unused entry.
    fn touch(&mut self, now: Instant) {
        if self.subscribers.is_empty() {
            self.expires_at = Some(now + self.retention);
        }
    }

    fn callbacks(&self) -> Vec<Callback> {
        self.subscribers.values().cloned().collect()
    }
}

fn notify(key: &CacheKey, event: &CacheEvent, callbacks: Vec<Callback>) {
    for callback in callbacks {
        callback(key, event);
    }
}

fn downcast<T: Clone + 'static>(key: &CacheKey, value: &CacheValue) -> Result<T, Error> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| Error::Other(format!("cached value for {} has an unexpected type", key)))
}

fn join_shared(handle: JoinHandle<Result<CacheValue, Error>>) -> SharedLoad {
    async move {
        handle
            .await
            .unwrap_or_else(|e| Err(Error::Other(format!("cache load task failed: {}", e))))
    }
    .boxed()
    .shared()
}

/// Owned by a spawned load. Releases the key's in-flight slot when the
/// task ends, including by panic or abort, so the next caller starts over.
struct LoadGuard {
    inner: Arc<Inner>,
    key: CacheKey,
    /// `Some` for cache loads, `None` for `shared` requests.
    options: Option<FetchOptions>,
    done: bool,
}

impl LoadGuard {
    fn new(inner: &Arc<Inner>, key: CacheKey, options: Option<FetchOptions>) -> Self {
        Self {
            inner: Arc::clone(inner),
            key,
            options,
            done: false,
        }
    }

    fn finish(&mut self, result: &Result<CacheValue, Error>) {
        self.done = true;
        match self.options.take() {
            Some(options) => self.inner.settle(&self.key, options, result),
            None => {
                self.inner.mutations.remove(&self.key);
            }
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!("load for {} ended without a result", self.key);
        let err = Error::Other(format!("load for {} ended without a result", self.key));
        self.finish(&Err(err));
    }
}

struct Inner {
    entries: DashMap<CacheKey, Entry>,
    tag_index: DashMap<Tag, HashSet<CacheKey>>,
    mutations: DashMap<CacheKey, SharedLoad>,
    next_subscriber: AtomicU64,
}

impl Inner {
    /// Record the outcome of a load or write and notify subscribers once.
    fn settle(&self, key: &CacheKey, options: FetchOptions, result: &Result<CacheValue, Error>) {
        let now = Instant::now();

        let (callbacks, retagged) = {
            let mut entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(options.ttl));
            entry.inflight = None;
            entry.retention = options.ttl;
            entry.touch(now);

            let retagged = match result {
                Ok(value) => {
                    let new_tags = options.tags_for(value);
                    entry.value = Some(Arc::clone(value));
                    entry.error = None;
                    entry.fresh = true;
                    Some((std::mem::replace(&mut entry.tags, new_tags.clone()), new_tags))
                }
                Err(err) => {
                    entry.error = Some(err.clone());
                    None
                }
            };
            (entry.callbacks(), retagged)
        };

        if let Some((old_tags, new_tags)) = retagged {
            self.reindex(key, &old_tags, &new_tags);
        }

        let event = match result {
            Ok(_) => CacheEvent::Updated,
            Err(err) => CacheEvent::Failed(err.clone()),
        };
        notify(key, &event, callbacks);
    }

    fn reindex(&self, key: &CacheKey, old_tags: &HashSet<Tag>, new_tags: &HashSet<Tag>) {
        for tag in old_tags.difference(new_tags) {
            self.unindex(key, tag);
        }
        for tag in new_tags.difference(old_tags) {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    fn unindex(&self, key: &CacheKey, tag: &Tag) {
        if let Some(mut keys) = self.tag_index.get_mut(tag) {
            keys.remove(key);
        }
        self.tag_index.remove_if(tag, |_, keys| keys.is_empty());
    }

    fn unsubscribe(&self, key: &CacheKey, id: u64) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.subscribers.remove(&id);
            entry.touch(Instant::now());
        }
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut evicted: Vec<(CacheKey, HashSet<Tag>)> = Vec::new();
        self.entries.retain(|key, entry| {
            let keep = entry.inflight.is_some() || !entry.is_expired(now);
            if !keep {
                evicted.push((key.clone(), std::mem::take(&mut entry.tags)));
            }
            keep
        });

        for (key, tags) in &evicted {
            for tag in tags {
                self.unindex(key, tag);
            }
        }
        evicted.len()
    }
}

// ── Store ─────────────────────────────────────────────────────────────

/// Shared handle to the request cache. Cloning is cheap; all clones see the
/// same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                tag_index: DashMap::new(),
                mutations: DashMap::new(),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Serve `key` from cache when fresh, otherwise run `loader`.
    ///
    /// Concurrent callers for the same key share a single load. `loader` is
    /// only called to build the future; it must not touch this store
    /// synchronously.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: CacheKey,
        options: FetchOptions,
        loader: F,
    ) -> Result<T, Error>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        enum Lookup {
            Hit(CacheValue),
            Pending(SharedLoad),
        }

        let now = Instant::now();
        let lookup = {
            let mut entry = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(options.ttl));
            entry.retention = options.ttl;

            let cached = if entry.is_fresh(now) {
                entry.value.clone()
            } else {
                None
            };

            if let Some(value) = cached {
                entry.touch(now);
                Lookup::Hit(value)
            } else if let Some(inflight) = entry.inflight.clone() {
                Lookup::Pending(inflight)
            } else {
                let load = self.spawn_load(key.clone(), options, loader());
                entry.inflight = Some(load.clone());
                Lookup::Pending(load)
            }
        };

        let value = match lookup {
            Lookup::Hit(value) => {
                debug!("cache hit {}", key);
                value
            }
            Lookup::Pending(load) => {
                debug!("awaiting load for {}", key);
                load.await?
            }
        };
        downcast(&key, &value)
    }

    fn spawn_load<T, Fut>(&self, key: CacheKey, options: FetchOptions, fut: Fut) -> SharedLoad
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let mut guard = LoadGuard::new(&self.inner, key.clone(), Some(options));
        let handle = tokio::spawn(async move {
            let result = fut.await.map(|value| Arc::new(value) as CacheValue);
            if let Err(err) = &result {
                warn!("load for {} failed: {}", key, err);
            }
            guard.finish(&result);
            result
        });
        join_shared(handle)
    }

    /// Store a value obtained elsewhere (e.g. a mutation response) as fresh.
    pub fn put<T>(&self, key: CacheKey, value: T, options: FetchOptions)
    where
        T: Send + Sync + 'static,
    {
        let value: CacheValue = Arc::new(value);
        debug!("cache put {}", key);
        self.inner.settle(&key, options, &Ok(value));
    }

    /// Run `loader` once for all concurrent callers of `key` without keeping
    /// the result afterwards.
    pub async fn shared<T, F, Fut>(&self, key: CacheKey, loader: F) -> Result<T, Error>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let load = match self.inner.mutations.entry(key.clone()) {
            MapEntry::Occupied(running) => {
                debug!("joining running request {}", key);
                running.get().clone()
            }
            MapEntry::Vacant(slot) => {
                let fut = loader();
                let mut guard = LoadGuard::new(&self.inner, key.clone(), None);
                let handle = tokio::spawn(async move {
                    let result = fut.await.map(|value| Arc::new(value) as CacheValue);
                    guard.finish(&result);
                    result
                });
                let load = join_shared(handle);
                slot.insert(load.clone());
                load
            }
        };

        let value = load.await?;
        downcast(&key, &value)
    }

    /// Mark every entry carrying `tag` stale. Entries that are already stale
    /// are skipped, so each is notified once. Returns how many were marked.
    pub fn invalidate(&self, tag: &Tag) -> usize {
        let keys: Vec<CacheKey> = self
            .inner
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();

        let mut marked = 0;
        for key in keys {
            let callbacks = match self.inner.entries.get_mut(&key) {
                Some(mut entry) if entry.fresh => {
                    entry.fresh = false;
                    entry.callbacks()
                }
                _ => continue,
            };
            marked += 1;
            notify(&key, &CacheEvent::Invalidated, callbacks);
        }

        debug!("invalidated {} entries tagged {}", marked, tag);
        marked
    }

    /// Register interest in `key`. The entry is kept while the returned
    /// handle is alive.
    pub fn subscribe<F>(&self, key: CacheKey, callback: F) -> Subscription
    where
        F: Fn(&CacheKey, &CacheEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        {
            let mut entry = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(DEFAULT_RETENTION));
            entry.subscribers.insert(id, Arc::new(callback));
            entry.expires_at = None;
        }

        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            id,
            active: true,
        }
    }

    /// Current value regardless of freshness.
    pub fn peek<T: Clone + 'static>(&self, key: &CacheKey) -> Option<T> {
        let value = self.inner.entries.get(key)?.value.clone()?;
        downcast(key, &value).ok()
    }

    pub fn state(&self, key: &CacheKey) -> CacheState {
        let Some(entry) = self.inner.entries.get(key) else {
            return CacheState::Missing;
        };

        if entry.inflight.is_some() {
            CacheState::Loading {
                refreshing: entry.value.is_some(),
            }
        } else if let Some(err) = &entry.error {
            CacheState::Failed(err.clone())
        } else if entry.is_fresh(Instant::now()) {
            CacheState::Fresh
        } else if entry.value.is_some() {
            CacheState::Stale
        } else {
            CacheState::Missing
        }
    }

    /// Drop one entry now, regardless of subscribers.
    ///
    /// Live subscriptions on `key` get `Removed` and are then detached: a
    /// later fetch of the same key builds a fresh entry without them.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let Some((key, entry)) = self.inner.entries.remove(key) else {
            return false;
        };
        for tag in &entry.tags {
            self.inner.unindex(&key, tag);
        }
        notify(&key, &CacheEvent::Removed, entry.callbacks());
        true
    }

    /// Evict unused entries whose retention window has elapsed.
    pub fn sweep(&self) -> usize {
        let evicted = self.inner.sweep(Instant::now());
        if evicted > 0 {
            debug!("evicted {} unused cache entries", evicted);
        }
        evicted
    }

    /// Sweep every `every` until the handle or the store is dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> Sweeper {
        let store = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = store.upgrade() else {
                    break;
                };
                let evicted = inner.sweep(Instant::now());
                if evicted > 0 {
                    debug!("evicted {} unused cache entries", evicted);
                }
            }
        });
        Sweeper { task }
    }

    /// Drop everything. Used at shutdown and between tests.
    pub fn clear(&self) {
        self.inner.entries.clear();
        self.inner.tag_index.clear();
        self.inner.mutations.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.inner.entries.len())
            .field("tags", &self.inner.tag_index.len())
            .finish()
    }
}

/// Handle returned by [`CacheStore::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<Inner>,
    key: CacheKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            inner.unsubscribe(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Background eviction task; aborted on drop.
pub struct Sweeper {
    task: JoinHandle<()>,
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}
