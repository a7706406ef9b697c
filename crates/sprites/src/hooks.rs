//! Behavior injected into the sprite table's load and save paths.

use sprite_engine_assets::{Bitmap, ColorDepth, Size};

/// Callbacks the owner injects into the sprite table, resolved once at
/// construction. Every method has a do-nothing default, so an impl only
/// overrides what it needs.
///
/// Hooks run in the middle of a table operation and must not call back
/// into the table; slot state is being updated around them.
pub trait SpriteHooks {
    /// Adjust stored metrics before they are recorded at attach time,
    /// e.g. to compensate for platform-specific padding or resampling.
    fn adjust_size(&mut self, size: Size, depth: ColorDepth) -> Size {
        let _ = depth;
        size
    }

    /// Convert a freshly loaded raw image for the current engine
    /// configuration. Returning `None` rejects the sprite, which the
    /// table then remaps to the placeholder. The returned image may have
    /// different dimensions than the stored metrics; the table records
    /// the actual post-conversion size.
    fn convert(&mut self, index: u32, image: Bitmap, depth: ColorDepth) -> Option<Bitmap> {
        let _ = (index, depth);
        Some(image)
    }

    /// Observer fired after a loaded sprite is already cached. May rewrite
    /// the pixel content in place, but must not change its size.
    fn post_load(&mut self, index: u32, image: &mut Bitmap) {
        let _ = (index, image);
    }

    /// Transform applied to each resident image right before it is handed
    /// to the asset store for writing. Content only, never size.
    fn pre_save(&mut self, image: &mut Bitmap) {
        let _ = image;
    }
}

/// The documented do-nothing hook set.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl SpriteHooks for DefaultHooks {}
