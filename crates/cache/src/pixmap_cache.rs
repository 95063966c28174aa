//! Page-pixmap cache with LRU eviction
//!
//! Maps `(page, pixel size, rotation, purpose)` to rendered bitmaps and
//! owns the eviction policy: least recently used first, never touching
//! entries protected by the visible set while anything else can go.
//!
//! The cache is keyed by value only; it has no knowledge of which backend
//! produced an entry. All mutation happens on the coordinating context
//! (single writer), so the cache is a plain struct without interior locks.

use std::collections::{BTreeSet, HashMap};

use vellum_generator::{Pixmap, RenderPurpose, RequestKey, Rotation};

use crate::config::CacheConfig;

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of pixmaps currently cached
    pub entry_count: usize,

    /// Total bytes used by cached pixmaps
    pub bytes_used: usize,

    /// Configured byte budget
    pub byte_budget: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted under memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Budget utilization in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.byte_budget == 0 {
            0.0
        } else {
            self.bytes_used as f64 / self.byte_budget as f64
        }
    }
}

/// Result of an insertion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The pixmap was stored (possibly after evictions).
    Inserted,

    /// The pixmap alone exceeds the whole budget and was not stored.
    /// The caller still owns a valid render result; it just is not
    /// retained.
    TooLarge,
}

struct Entry {
    pixmap: Pixmap,
    bytes: usize,
    last_access: u64,
}

/// Bounded-memory pixmap cache.
pub struct PixmapCache {
    entries: HashMap<RequestKey, Entry>,
    byte_budget: usize,
    bytes_used: usize,
    /// Monotonic access clock; higher means more recently used.
    clock: u64,
    /// Pages currently on screen. While non-empty, only `Visible`-purpose
    /// entries for these pages are protected; a `Visible` entry for a page
    /// the user scrolled away from becomes evictable again.
    visible_pages: BTreeSet<usize>,
    stats: CacheStats,
}

impl PixmapCache {
    pub fn new(byte_budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            byte_budget,
            bytes_used: 0,
            clock: 0,
            visible_pages: BTreeSet::new(),
            stats: CacheStats {
                byte_budget,
                ..Default::default()
            },
        }
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self::new(config.byte_budget)
    }

    pub fn with_mb_budget(mb: usize) -> Self {
        Self::new(mb * 1024 * 1024)
    }

    /// Exact-key lookup. A hit refreshes the entry's LRU stamp.
    pub fn get(&mut self, key: &RequestKey) -> Option<&Pixmap> {
        self.clock += 1;
        let clock = self.clock;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = clock;
                self.stats.hits += 1;
                Some(&entry.pixmap)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Whether an exact key is cached, without touching LRU state or
    /// statistics.
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Best available entry for a page at any size or purpose, for use as
    /// a display placeholder while an exact-size render is pending.
    ///
    /// Placeholder lookup only: it never schedules anything, never counts
    /// toward hit statistics, and callers may ignore it entirely.
    pub fn find_near(&self, page_index: usize, rotation: Rotation) -> Option<(RequestKey, &Pixmap)> {
        self.entries
            .iter()
            .filter(|(key, _)| key.page_index == page_index && key.rotation == rotation)
            .max_by_key(|(_, entry)| entry.last_access)
            .map(|(key, entry)| (*key, &entry.pixmap))
    }

    /// Store a rendered pixmap, evicting LRU non-protected entries until
    /// the budget is satisfied. Re-inserting an existing key replaces the
    /// old pixmap.
    pub fn insert(&mut self, key: RequestKey, pixmap: Pixmap) -> InsertOutcome {
        let bytes = pixmap.byte_size();
        if bytes > self.byte_budget {
            return InsertOutcome::TooLarge;
        }

        if let Some(old) = self.entries.remove(&key) {
            self.bytes_used -= old.bytes;
        }

        self.evict_to_fit(bytes);

        self.clock += 1;
        self.entries.insert(
            key,
            Entry {
                pixmap,
                bytes,
                last_access: self.clock,
            },
        );
        self.bytes_used += bytes;
        self.sync_stats();
        InsertOutcome::Inserted
    }

    /// Mark the pages currently on screen. Their `Visible`-purpose entries
    /// are skipped by normal eviction; pass an empty iterator to fall back
    /// to protecting every `Visible`-purpose entry.
    pub fn set_visible_pages(&mut self, pages: impl IntoIterator<Item = usize>) {
        self.visible_pages = pages.into_iter().collect();
    }

    /// Drop every entry for a page, regardless of size and purpose. Used
    /// when an edit changes the page's appearance. Returns the number of
    /// entries removed.
    pub fn invalidate_page(&mut self, page_index: usize) -> usize {
        let doomed: Vec<RequestKey> = self
            .entries
            .keys()
            .filter(|key| key.page_index == page_index)
            .copied()
            .collect();
        for key in &doomed {
            if let Some(entry) = self.entries.remove(key) {
                self.bytes_used -= entry.bytes;
            }
        }
        self.sync_stats();
        doomed.len()
    }

    /// Drop everything. Used on document close.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes_used = 0;
        self.sync_stats();
    }

    /// Change the byte budget, evicting if the cache is now over it.
    pub fn set_byte_budget(&mut self, byte_budget: usize) {
        self.byte_budget = byte_budget;
        self.stats.byte_budget = byte_budget;
        if self.bytes_used > byte_budget {
            self.evict_to_fit(0);
            self.sync_stats();
        }
    }

    pub fn byte_budget(&self) -> usize {
        self.byte_budget
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn protected(&self, key: &RequestKey) -> bool {
        key.purpose == RenderPurpose::Visible
            && (self.visible_pages.is_empty() || self.visible_pages.contains(&key.page_index))
    }

    /// Evict until `incoming` extra bytes fit. Non-protected entries go
    /// first in LRU order; protected entries are the last resort when the
    /// budget cannot otherwise be satisfied.
    fn evict_to_fit(&mut self, incoming: usize) {
        while self.bytes_used + incoming > self.byte_budget {
            if !self.evict_one(false) && !self.evict_one(true) {
                break;
            }
        }
    }

    fn evict_one(&mut self, allow_protected: bool) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(key, _)| allow_protected || !self.protected(key))
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| *key);

        match victim {
            Some(key) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.bytes_used -= entry.bytes;
                    self.stats.evictions += 1;
                }
                true
            }
            None => false,
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.bytes_used = self.bytes_used;
    }
}

impl Default for PixmapCache {
    fn default() -> Self {
        Self::with_config(&CacheConfig::default())
    }
}
