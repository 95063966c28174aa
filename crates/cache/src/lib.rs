//! Vellum Pixmap Cache
//!
//! Bounded-memory storage of rendered page bitmaps keyed by
//! `(page, size, rotation, purpose)`, with LRU eviction that spares the
//! currently visible range.

pub mod config;
pub mod pixmap_cache;

pub use config::CacheConfig;
pub use pixmap_cache::{CacheStats, InsertOutcome, PixmapCache};
