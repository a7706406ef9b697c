//! The asset store boundary.
//!
//! A store owns an open packed resource file. It reports per-index metrics,
//! loads single decoded images on demand, and can write a new packed file
//! from an ordered list of `(exists, image)` pairs plus a side index file.

use std::path::Path;

use crate::bitmap::{Bitmap, ColorDepth, Size};

#[derive(Debug, thiserror::Error)]
pub enum AssetStoreError {
    #[error("no store file is open")]
    NotOpen,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a sprite store file: {0}")]
    BadFormat(String),
    #[error("unsupported store version {0}")]
    UnsupportedVersion(u16),
    #[error("sprite index {index} out of range (count={count})")]
    IndexOutOfRange { index: u32, count: usize },
    #[error("no sprite stored at index {0}")]
    EmptySlot(u32),
    #[error("corrupt sprite data at index {0}: {1}")]
    Corrupt(u32, String),
}

/// Per-entry payload compression in the packed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// Raw pixel bytes.
    #[default]
    None = 0,
    /// LZ4 with a prepended decompressed-size word.
    Lz4 = 1,
}

impl Compression {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Compression::None),
            1 => Some(Compression::Lz4),
            _ => None,
        }
    }
}

/// Options applied to every entry written by [`AssetStore::save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub compression: Compression,
}

/// Location and metrics of one stored sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Byte offset of the entry record in the data file.
    pub offset: u64,
    pub size: Size,
    pub depth: ColorDepth,
}

/// The side index of a packed file: one slot per sprite id, `None` for
/// empty slots. Lets a store report metrics and seek to entries without
/// scanning the data file.
#[derive(Debug, Clone, Default)]
pub struct StoreIndex {
    pub entries: Vec<Option<IndexEntry>>,
}

impl StoreIndex {
    pub fn sprite_count(&self) -> usize {
        self.entries.len()
    }

    /// Per-index metrics, ordered by slot id.
    pub fn metrics(&self) -> Vec<Option<Size>> {
        self.entries.iter().map(|e| e.map(|e| e.size)).collect()
    }
}

/// Boundary trait for the packed resource file collaborator.
///
/// A store is the sole owner of its file-handle state. All operations are
/// synchronous and single-threaded.
pub trait AssetStore {
    /// Number of slots in the open file (0 when closed).
    fn sprite_count(&self) -> usize;

    /// Per-index metrics, ordered by slot id; `None` marks an empty slot.
    fn metrics(&self) -> Result<Vec<Option<Size>>, AssetStoreError>;

    /// Load and decode the image stored at `index`.
    fn load_one(&mut self, index: u32) -> Result<Bitmap, AssetStoreError>;

    /// Write a new packed file at `path` (plus a side index file at
    /// `index_path`, when given) from an ordered list of
    /// `(exists, image)` pairs.
    ///
    /// For an `(true, None)` entry the store loads the image from its own
    /// open file; if it cannot, the entry is written as empty rather than
    /// failing the whole save. `path` must not be the file currently open
    /// in this store.
    fn save(
        &mut self,
        path: &Path,
        index_path: Option<&Path>,
        entries: &[(bool, Option<&Bitmap>)],
        options: SaveOptions,
    ) -> Result<StoreIndex, AssetStoreError>;

    /// Release the open file handle. Safe to call redundantly.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
