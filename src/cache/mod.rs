//! Storage for rendered toolbars.
//!
//! [`CacheStore`] is the seam the panel writes through; [`MemoryCache`] is the
//! in-process backend used when the host does not bring its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::RwLock;

/// Namespace prefix for every key the panel writes.
pub const KEY_PREFIX: &str = "django-debug-panel:";

/// Cache key under which the toolbar rendered at `timestamp` is stored.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     debug_panel::cache::cache_key("1700000000.000001"),
///     "django-debug-panel:1700000000.000001"
/// );
/// ```
pub fn cache_key(timestamp: &str) -> String {
    format!("{KEY_PREFIX}{timestamp}")
}

/// Key/value store holding rendered toolbar HTML.
///
/// Implementations are shared between every in-flight request and must do
/// their own synchronization. Writes are fire-and-forget: a backend that
/// cannot store a value simply drops it, and later reads see a miss.
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Arc<str>);

    /// Returns the live value under `key`, if any.
    fn get(&self, key: &str) -> Option<Arc<str>>;

    /// Removes `key`; returns whether anything was stored under it.
    fn delete(&self, key: &str) -> bool;
}

struct Entry {
    value: Arc<str>,
    inserted: Instant,
    // `None` when the timeout reaches past what `Instant` can represent.
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

/// Bounded in-memory cache with a per-entry timeout.
///
/// When an insert would push the cache past `max_entries`, expired entries are
/// purged first and then the oldest remaining entries are culled until there
/// is room.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use debug_panel::cache::{CacheStore, MemoryCache};
///
/// let cache = MemoryCache::new(Duration::from_secs(60), 2);
/// cache.set("a", "1".into());
/// cache.set("b", "2".into());
/// cache.set("c", "3".into());
///
/// assert_eq!(cache.len(), 2);
/// assert!(cache.get("a").is_none());
/// assert_eq!(cache.get("c").as_deref(), Some("3"));
/// ```
pub struct MemoryCache {
    entries: RwLock<AHashMap<String, Entry>>,
    timeout: Duration,
    max_entries: usize,
}

impl MemoryCache {
    /// Creates an empty cache whose entries live for `timeout` and which
    /// holds at most `max_entries` (at least one).
    ///
    /// A timeout too large to add to the current instant means entries never
    /// expire; they still leave through the `max_entries` cull.
    pub fn new(timeout: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
            timeout,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns how long an entry stays readable after it is set.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the entry count above which the oldest entries are culled.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries, including ones that expired but were not
    /// purged yet.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn make_room(entries: &mut AHashMap<String, Entry>, max_entries: usize, now: Instant) {
        if entries.len() < max_entries {
            return;
        }
        entries.retain(|_, entry| entry.is_live(now));

        let excess = (entries.len() + 1).saturating_sub(max_entries);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(Instant, String)> = entries
            .iter()
            .map(|(key, entry)| (entry.inserted, key.clone()))
            .collect();
        by_age.sort_unstable();
        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
        }
        tracing::trace!(culled = excess, "debug panel cache full");
    }

    // Runs under the write lock; a `set` may have refreshed the key since the
    // read lock saw it expired.
    fn evict_expired(entries: &mut AHashMap<String, Entry>, key: &str, now: Instant) -> Option<Arc<str>> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(Arc::clone(&entry.value)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 300)
    }
}

impl CacheStore for MemoryCache {
    fn set(&self, key: &str, value: Arc<str>) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            Self::make_room(&mut entries, self.max_entries, now);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value,
                inserted: now,
                expires: now.checked_add(self.timeout),
            },
        );
    }

    fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
                None => return None,
            }
        }
        Self::evict_expired(&mut self.entries.write(), key, now)
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}
