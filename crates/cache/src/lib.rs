//! Sprite Engine Cache Library
//!
//! Generic budgeted resource cache with LRU eviction and eviction pins.

pub mod resource;

pub use resource::{CacheSize, CacheStats, ItemFlags, ResourceCache};
