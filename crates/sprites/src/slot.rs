//! Per-slot state kept by the sprite table, independent of whether the
//! pixel payload is currently resident.

use sprite_engine_assets::{ColorDepth, Size};

/// Capability flags of one sprite slot.
///
/// A slot with no flags set does not exist: it holds no image and reports
/// no metadata. The transition rules are owned by the sprite table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotFlags {
    /// The sprite is found in the attached asset store and can be
    /// (re)loaded from it at any time.
    pub asset: bool,
    /// The image was assigned externally; the table never loads or evicts
    /// it on its own.
    pub external: bool,
    /// The resident image must survive automatic eviction.
    pub locked: bool,
    /// The slot was redirected to the placeholder sprite after a failed
    /// load; it shares the placeholder's metadata and never holds its own
    /// resident image.
    pub remapped: bool,
}

impl SlotFlags {
    /// True if no flags are set, i.e. the slot holds nothing.
    pub fn is_empty(self) -> bool {
        self == SlotFlags::default()
    }
}

/// Resolution and format metadata of one slot, recorded at attach or
/// assignment time and kept while the payload itself may come and go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteInfo {
    pub size: Size,
    pub depth: ColorDepth,
}

impl SpriteInfo {
    pub fn new(size: Size, depth: ColorDepth) -> Self {
        Self { size, depth }
    }
}
