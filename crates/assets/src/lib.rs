//! Sprite Engine Asset Store
//!
//! Owns the packed sprite resource file format and its I/O: the shared
//! pixel-buffer type, the [`AssetStore`] boundary trait, and the concrete
//! [`SpriteFile`] packed-file store.

pub mod bitmap;
pub mod spritefile;
pub mod store;

pub use bitmap::{Bitmap, ColorDepth, Size};
pub use spritefile::SpriteFile;
pub use store::{AssetStore, AssetStoreError, Compression, IndexEntry, SaveOptions, StoreIndex};
