//! Budgeted resource cache with LRU eviction
//!
//! Holds a bounded working set of heavyweight items keyed by small integer
//! ids. When the byte budget is exceeded, the least recently used items are
//! evicted automatically, except for items pinned as locked or external.

use std::collections::{HashMap, VecDeque};

use log::debug;

/// Default memory limit when none is configured (128 MB).
pub const DEFAULT_LIMIT_MB: usize = 128;

/// Reports the in-memory payload size of a cached item.
///
/// The cache accounts budget usage from this value at insertion time;
/// items must not change size while resident.
pub trait CacheSize {
    /// Payload size in bytes.
    fn byte_size(&self) -> usize;
}

/// Eviction pins attached to a cache entry.
///
/// A locked or external item is never chosen as an automatic eviction
/// victim; the two flags behave identically for eviction and differ only
/// in what they tell the owner about where the item came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFlags {
    /// Pinned by the owner because the item is known to be needed soon.
    pub locked: bool,
    /// Assigned from outside the backing store; the owner disposes it
    /// explicitly, never the eviction loop.
    pub external: bool,
}

impl ItemFlags {
    /// No pins; the item is a regular eviction candidate.
    pub const NONE: ItemFlags = ItemFlags { locked: false, external: false };

    /// Locked pin only.
    pub const LOCKED: ItemFlags = ItemFlags { locked: true, external: false };

    /// External item, implicitly also locked.
    pub const EXTERNAL: ItemFlags = ItemFlags { locked: true, external: true };

    /// True if the item is exempt from automatic eviction.
    pub fn is_pinned(self) -> bool {
        self.locked || self.external
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of items currently in cache
    pub item_count: usize,

    /// Total memory used by cached items (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes)
    pub memory_limit: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of items evicted due to memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

struct Entry<T> {
    item: T,
    flags: ItemFlags,
    size: usize,
}

/// Budgeted cache mapping small integer keys to owned heavyweight items.
///
/// Recency order is approximate LRU: a queue with least recently used at
/// the front. Automatic eviction walks the queue oldest-first, skipping
/// pinned entries, until usage is back under the limit or nothing
/// evictable remains. The entry inserted by the current `put` call is
/// never chosen by its own eviction pass, so a single item larger than
/// the whole budget stays resident.
///
/// The cache is the sole owner of resident payloads. It is synchronous
/// and single-threaded by design; callers serialize access themselves.
///
/// # Example
///
/// ```
/// use sprite_engine_cache::{CacheSize, ItemFlags, ResourceCache};
///
/// struct Blob(Vec<u8>);
///
/// impl CacheSize for Blob {
///     fn byte_size(&self) -> usize {
///         self.0.len()
///     }
/// }
///
/// let mut cache = ResourceCache::new(1024);
/// cache.put(7, Blob(vec![0u8; 512]), ItemFlags::NONE);
/// assert!(cache.exists(7));
/// assert_eq!(cache.memory_used(), 512);
/// ```
pub struct ResourceCache<T> {
    entries: HashMap<u32, Entry<T>>,

    /// LRU queue (most recently used at back, least recently used at front)
    lru_queue: VecDeque<u32>,

    memory_used: usize,
    memory_limit: usize,

    stats: CacheStats,
}

impl<T: CacheSize> ResourceCache<T> {
    /// Create a new cache with the specified memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    /// Create a new cache with a memory limit in megabytes.
    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    /// Store an item in the cache, taking ownership of it.
    ///
    /// Replaces any existing entry for `key`, marks the new entry most
    /// recently used and then evicts unpinned entries, oldest first, until
    /// usage is within the limit. The item inserted by this call is never
    /// evicted by this call.
    pub fn put(&mut self, key: u32, item: T, flags: ItemFlags) {
        let size = item.byte_size();

        if let Some(old) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(old.size);
            self.lru_queue.retain(|&k| k != key);
        }

        self.entries.insert(key, Entry { item, flags, size });
        self.lru_queue.push_back(key);
        self.memory_used += size;

        self.evict_over_budget(Some(key));
        self.sync_stats();
    }

    /// Retrieve an item, refreshing its recency on a hit.
    pub fn get(&mut self, key: u32) -> Option<&T> {
        if self.entries.contains_key(&key) {
            self.touch(key);
            self.stats.hits += 1;
            self.entries.get(&key).map(|e| &e.item)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Retrieve an item without updating recency or statistics.
    pub fn peek(&self, key: u32) -> Option<&T> {
        self.entries.get(&key).map(|e| &e.item)
    }

    /// Mutable access to an item without updating recency.
    ///
    /// The caller may rewrite the payload's contents but must not change
    /// its byte size; the budget accounting keeps the size recorded at
    /// insertion.
    pub fn peek_mut(&mut self, key: u32) -> Option<&mut T> {
        self.entries.get_mut(&key).map(|e| &mut e.item)
    }

    /// Check for an entry without touching recency or statistics.
    pub fn exists(&self, key: u32) -> bool {
        self.entries.contains_key(&key)
    }

    /// Promote an entry to locked without altering its content.
    ///
    /// Returns false if there is no entry for `key`.
    pub fn lock(&mut self, key: u32) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.flags.locked = true;
                true
            }
            None => false,
        }
    }

    /// Forcibly free one entry's payload regardless of pin state.
    ///
    /// This is the owner's deliberate reclaim path, distinct from
    /// automatic eviction which respects pins. Returns false if there was
    /// nothing to free.
    pub fn dispose(&mut self, key: u32) -> bool {
        let found = self.drop_entry(key).is_some();
        self.sync_stats();
        found
    }

    /// Free every unpinned payload at once.
    ///
    /// Coarse memory-pressure relief, e.g. on room change.
    pub fn dispose_free_items(&mut self) {
        let free: Vec<u32> = self
            .lru_queue
            .iter()
            .copied()
            .filter(|k| self.entries.get(k).map_or(false, |e| !e.flags.is_pinned()))
            .collect();
        for key in free {
            self.drop_entry(key);
        }
        self.sync_stats();
    }

    /// Detach an entry and hand its payload back to the caller.
    pub fn remove(&mut self, key: u32) -> Option<T> {
        let entry = self.drop_entry(key);
        self.sync_stats();
        entry.map(|e| e.item)
    }

    /// Drop all entries and reset the usage counter to zero.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
        self.memory_used = 0;
        self.sync_stats();
    }

    /// Update the memory limit.
    ///
    /// If the new limit is smaller than current usage, unpinned items are
    /// evicted until usage is below the new limit.
    pub fn set_memory_limit(&mut self, new_limit: usize) {
        self.memory_limit = new_limit;
        self.stats.memory_limit = new_limit;
        self.evict_over_budget(None);
        self.sync_stats();
    }

    /// Current memory limit in bytes.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Current memory usage in bytes.
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    /// Number of items currently resident.
    pub fn item_count(&self) -> usize {
        self.entries.len()
    }

    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Move a key to the back of the LRU queue (mark as most recently used)
    fn touch(&mut self, key: u32) {
        self.lru_queue.retain(|&k| k != key);
        self.lru_queue.push_back(key);
    }

    /// Remove an entry outside of the eviction path. Not counted as an
    /// eviction in the statistics.
    fn drop_entry(&mut self, key: u32) -> Option<Entry<T>> {
        let entry = self.entries.remove(&key)?;
        self.memory_used = self.memory_used.saturating_sub(entry.size);
        self.lru_queue.retain(|&k| k != key);
        Some(entry)
    }

    /// Evict oldest-first until usage fits the limit, skipping pinned
    /// entries and the just-inserted `keep` key.
    fn evict_over_budget(&mut self, keep: Option<u32>) {
        while self.memory_used > self.memory_limit {
            let victim = self.lru_queue.iter().copied().find(|&k| {
                Some(k) != keep
                    && self.entries.get(&k).map_or(false, |e| !e.flags.is_pinned())
            });
            let Some(victim) = victim else {
                break;
            };
            self.drop_entry(victim);
            self.stats.evictions += 1;
            debug!(
                "evicted item {victim}, usage now {} / {} bytes",
                self.memory_used, self.memory_limit
            );
        }
    }

    fn sync_stats(&mut self) {
        self.stats.item_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

impl<T: CacheSize> Default for ResourceCache<T> {
    /// Create a cache with the default 128 MB limit.
    fn default() -> Self {
        Self::with_mb_limit(DEFAULT_LIMIT_MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Buf(Vec<u8>);

    impl CacheSize for Buf {
        fn byte_size(&self) -> usize {
            self.0.len()
        }
    }

    fn buf(len: usize) -> Buf {
        Buf(vec![0u8; len])
    }

    #[test]
    fn test_basic_put_get() {
        let mut cache = ResourceCache::new(1024 * 1024);

        cache.put(1, Buf(vec![7u8; 256]), ItemFlags::NONE);

        let item = cache.get(1).expect("item should be in cache");
        assert_eq!(item.0, vec![7u8; 256]);
        assert_eq!(cache.memory_used(), 256);
    }

    #[test]
    fn test_cache_miss() {
        let mut cache = ResourceCache::<Buf>::new(1024 * 1024);

        assert!(cache.get(999).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(256), ItemFlags::NONE);
        cache.put(2, buf(256), ItemFlags::NONE);
        cache.put(3, buf(256), ItemFlags::NONE); // evicts item 1

        assert!(!cache.exists(1));
        assert!(cache.exists(2));
        assert!(cache.exists(3));
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.memory_used() <= 512);
    }

    #[test]
    fn test_lru_ordering() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(256), ItemFlags::NONE);
        cache.put(2, buf(256), ItemFlags::NONE);

        // Access item 1 to make it more recently used
        assert!(cache.get(1).is_some());

        // Adding item 3 should evict item 2 (now least recently used)
        cache.put(3, buf(256), ItemFlags::NONE);

        assert!(cache.exists(1));
        assert!(!cache.exists(2));
        assert!(cache.exists(3));
    }

    #[test]
    fn test_unpinned_items_never_exceed_budget() {
        // 1 MB budget: two unpinned 600 KB items cannot coexist.
        let mut cache = ResourceCache::new(1_000_000);

        cache.put(1, buf(600_000), ItemFlags::NONE);
        cache.put(2, buf(600_000), ItemFlags::NONE);

        assert!(!cache.exists(1));
        assert!(cache.exists(2));
        assert!(cache.memory_used() <= 1_000_000);
    }

    #[test]
    fn test_locked_items_survive_over_budget() {
        let mut cache = ResourceCache::new(1_000_000);

        cache.put(1, buf(600_000), ItemFlags::LOCKED);
        cache.put(2, buf(600_000), ItemFlags::LOCKED);
        cache.put(3, buf(600_000), ItemFlags::NONE);

        // Both locked items stay even though the total exceeds the budget.
        assert!(cache.exists(1));
        assert!(cache.exists(2));
        assert!(cache.exists(3));
        assert!(cache.memory_used() > 1_000_000);
    }

    #[test]
    fn test_external_items_not_evicted() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(256), ItemFlags::EXTERNAL);
        cache.put(2, buf(256), ItemFlags::NONE);
        cache.put(3, buf(256), ItemFlags::NONE);

        assert!(cache.exists(1));
        assert!(!cache.exists(2));
        assert!(cache.exists(3));
    }

    #[test]
    fn test_single_item_larger_than_budget_is_kept() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(4096), ItemFlags::NONE);

        // Nothing smaller to evict, so the item stays resident.
        assert!(cache.exists(1));
        assert_eq!(cache.memory_used(), 4096);

        // The next insert evicts it as usual.
        cache.put(2, buf(256), ItemFlags::NONE);
        assert!(!cache.exists(1));
        assert!(cache.exists(2));
    }

    #[test]
    fn test_lock_promotion() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(256), ItemFlags::NONE);
        assert!(cache.lock(1));
        assert!(!cache.lock(999));

        cache.put(2, buf(256), ItemFlags::NONE);
        cache.put(3, buf(256), ItemFlags::NONE);

        // Item 1 is locked now, so item 2 was the eviction victim.
        assert!(cache.exists(1));
        assert!(!cache.exists(2));
        assert!(cache.exists(3));
    }

    #[test]
    fn test_dispose_ignores_pins() {
        let mut cache = ResourceCache::new(1024);

        cache.put(1, buf(256), ItemFlags::EXTERNAL);
        assert!(cache.dispose(1));
        assert!(!cache.exists(1));
        assert_eq!(cache.memory_used(), 0);

        // Disposing again reports nothing to free.
        assert!(!cache.dispose(1));
    }

    #[test]
    fn test_dispose_free_items_keeps_pinned() {
        let mut cache = ResourceCache::new(4096);

        cache.put(1, buf(256), ItemFlags::NONE);
        cache.put(2, buf(256), ItemFlags::LOCKED);
        cache.put(3, buf(256), ItemFlags::EXTERNAL);
        cache.put(4, buf(256), ItemFlags::NONE);

        cache.dispose_free_items();

        assert!(!cache.exists(1));
        assert!(cache.exists(2));
        assert!(cache.exists(3));
        assert!(!cache.exists(4));
        assert_eq!(cache.memory_used(), 512);
    }

    #[test]
    fn test_remove_returns_payload() {
        let mut cache = ResourceCache::new(1024);

        cache.put(1, Buf(vec![9u8; 128]), ItemFlags::NONE);

        let removed = cache.remove(1).expect("payload should be returned");
        assert_eq!(removed.0, vec![9u8; 128]);
        assert!(!cache.exists(1));
        assert_eq!(cache.memory_used(), 0);

        assert!(cache.remove(1).is_none());
    }

    #[test]
    fn test_clear() {
        let mut cache = ResourceCache::new(4096);

        cache.put(1, buf(256), ItemFlags::NONE);
        cache.put(2, buf(256), ItemFlags::LOCKED);

        cache.clear();

        assert_eq!(cache.item_count(), 0);
        assert_eq!(cache.memory_used(), 0);
        assert!(!cache.exists(1));
        assert!(!cache.exists(2));
    }

    #[test]
    fn test_replace_same_key() {
        let mut cache = ResourceCache::new(4096);

        cache.put(1, Buf(vec![1u8; 256]), ItemFlags::NONE);
        cache.put(1, Buf(vec![2u8; 512]), ItemFlags::NONE);

        assert_eq!(cache.item_count(), 1);
        assert_eq!(cache.memory_used(), 512);
        assert_eq!(cache.get(1).unwrap().0, vec![2u8; 512]);
    }

    #[test]
    fn test_new_item_never_evicted_by_own_insert() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(600), ItemFlags::NONE);
        cache.put(2, buf(600), ItemFlags::NONE);

        assert!(!cache.exists(1));
        assert!(cache.exists(2));
    }

    #[test]
    fn test_set_memory_limit_evicts() {
        let mut cache = ResourceCache::new(1024);

        cache.put(1, buf(256), ItemFlags::NONE);
        cache.put(2, buf(256), ItemFlags::NONE);
        cache.put(3, buf(256), ItemFlags::NONE);

        cache.set_memory_limit(512);

        assert_eq!(cache.item_count(), 2);
        assert!(cache.memory_used() <= 512);
        assert_eq!(cache.memory_limit(), 512);
    }

    #[test]
    fn test_peek_does_not_refresh_recency() {
        let mut cache = ResourceCache::new(512);

        cache.put(1, buf(256), ItemFlags::NONE);
        cache.put(2, buf(256), ItemFlags::NONE);

        // Peeking at item 1 must not save it from eviction.
        assert!(cache.peek(1).is_some());
        cache.put(3, buf(256), ItemFlags::NONE);

        assert!(!cache.exists(1));
        assert!(cache.exists(2));
        assert!(cache.exists(3));
    }

    #[test]
    fn test_stats() {
        let mut cache = ResourceCache::new(1024 * 1024);

        cache.put(1, buf(256), ItemFlags::NONE);

        let _ = cache.get(1);
        let _ = cache.get(2);
        let _ = cache.get(3);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.item_count, 1);
        assert!((stats.hit_rate() - 0.333).abs() < 0.01);
    }
}
