//! Sprite Engine Sprite Table
//!
//! Maps stable sprite ids to asset-backed or externally supplied images,
//! hiding cache eviction behind transparent re-load and degrading broken
//! slots to the placeholder sprite instead of failing.

pub mod hooks;
pub mod slot;
pub mod table;

pub use hooks::{DefaultHooks, SpriteHooks};
pub use slot::{SlotFlags, SpriteInfo};
pub use table::{SpriteCache, SpriteCacheError, MAX_SPRITE_INDEX, MIN_SPRITE_INDEX, PLACEHOLDER_INDEX};

pub use sprite_engine_assets::{Bitmap, ColorDepth, Size};
