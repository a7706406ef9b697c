//! The sprite table: stable sprite ids on top of the budgeted cache.
//!
//! Each slot is either empty, asset-backed (lazily loaded from the
//! attached store, evictable, transparently re-loaded), or external
//! (assigned by the owner, pinned until explicitly removed). A slot whose
//! load fails is remapped to the placeholder sprite instead of failing
//! the caller.

use std::path::Path;

use log::{debug, error, warn};

use sprite_engine_assets::{
    AssetStore, AssetStoreError, Bitmap, SaveOptions, Size, SpriteFile, StoreIndex,
};
use sprite_engine_cache::{CacheStats, ItemFlags, ResourceCache};

use crate::hooks::{DefaultHooks, SpriteHooks};
use crate::slot::{SlotFlags, SpriteInfo};

/// The sprite every broken slot is redirected to. Once loaded it is
/// always locked and never evicted.
pub const PLACEHOLDER_INDEX: u32 = 0;

/// First id handed out by the free-slot search; the placeholder id is
/// never reused.
pub const MIN_SPRITE_INDEX: u32 = 1;

/// Hard upper bound on valid sprite ids.
pub const MAX_SPRITE_INDEX: u32 = i32::MAX as u32 - 1;

#[derive(Debug, thiserror::Error)]
pub enum SpriteCacheError {
    #[error("sprite store error: {0}")]
    Store(#[from] AssetStoreError),
    #[error("sprite index {index} out of range (max={max})")]
    IndexOutOfRange { index: u32, max: u32 },
}

/// Sprite table with lazy loading and budgeted caching.
///
/// The table owns per-slot metadata; the pixel payloads live in the
/// budgeted cache and may be evicted at any time, in which case the next
/// access loads them again from the attached store. Synchronous and
/// single-threaded throughout: every operation runs to completion before
/// returning.
pub struct SpriteCache {
    infos: Vec<SpriteInfo>,
    slots: Vec<SlotFlags>,
    cache: ResourceCache<Bitmap>,
    store: Option<Box<dyn AssetStore>>,
    hooks: Box<dyn SpriteHooks>,
}

impl SpriteCache {
    /// Create an empty table with the default cache budget.
    pub fn new(hooks: Box<dyn SpriteHooks>) -> Self {
        Self {
            infos: Vec::new(),
            slots: Vec::new(),
            cache: ResourceCache::default(),
            store: None,
            hooks,
        }
    }

    /// Create an empty table with an explicit cache budget in bytes.
    pub fn with_memory_limit(memory_limit: usize, hooks: Box<dyn SpriteHooks>) -> Self {
        Self {
            cache: ResourceCache::new(memory_limit),
            ..Self::new(hooks)
        }
    }

    /// Attach an opened asset store, resetting the table first.
    ///
    /// Every index the store reports metrics for becomes asset-backed,
    /// with its recorded resolution run through the size-adjustment hook;
    /// indices with no metrics are initialized empty. Returns the new
    /// slot count.
    pub fn attach_store(
        &mut self,
        store: Box<dyn AssetStore>,
    ) -> Result<usize, SpriteCacheError> {
        self.reset();
        let metrics = store.metrics()?;
        self.store = Some(store);

        self.infos = vec![SpriteInfo::default(); metrics.len()];
        self.slots = vec![SlotFlags::default(); metrics.len()];
        for (i, metric) in metrics.iter().enumerate() {
            if let Some(size) = metric {
                self.slots[i].asset = true;
                self.infos[i].size = self.hooks.adjust_size(*size, self.infos[i].depth);
            }
        }
        debug!("attached sprite store with {} slots", self.slots.len());
        Ok(self.slots.len())
    }

    /// Open a packed sprite file and attach it.
    pub fn attach_file(
        &mut self,
        path: &Path,
        index_path: Option<&Path>,
    ) -> Result<usize, SpriteCacheError> {
        let store = SpriteFile::open(path, index_path)?;
        self.attach_store(Box::new(store))
    }

    /// Close the attached store, keeping the slot table.
    ///
    /// Asset-backed sprites that are not resident will remap to the
    /// placeholder on their next access.
    pub fn detach_store(&mut self) {
        if let Some(store) = self.store.as_mut() {
            store.close();
        }
        self.store = None;
    }

    /// Drop the store, all cached images and all slot state.
    pub fn reset(&mut self) {
        self.detach_store();
        self.cache.clear();
        self.infos.clear();
        self.slots.clear();
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn has_free_slots(&self) -> bool {
        self.slots.len() <= MAX_SPRITE_INDEX as usize
    }

    /// True if the slot holds anything at all (asset-backed, external or
    /// remapped).
    pub fn sprite_exists(&self, index: u32) -> bool {
        self.slots
            .get(index as usize)
            .map_or(false, |flags| !flags.is_empty())
    }

    /// True if the sprite is found in the attached game resources.
    pub fn is_asset_sprite(&self, index: u32) -> bool {
        self.slots
            .get(index as usize)
            .map_or(false, |flags| flags.asset)
    }

    /// The flags of one slot, if it is in range.
    pub fn slot_flags(&self, index: u32) -> Option<SlotFlags> {
        self.slots.get(index as usize).copied()
    }

    /// Recorded resolution of a sprite, `None` if the slot is empty.
    pub fn resolution(&self, index: u32) -> Option<Size> {
        if self.sprite_exists(index) {
            Some(self.infos[index as usize].size)
        } else {
            None
        }
    }

    /// The read path: fetch a sprite's image, loading it if necessary.
    ///
    /// Out-of-range ids return `None` without side effects. A remapped id
    /// resolves to the placeholder. A miss on an asset-backed slot
    /// triggers a load; a load or conversion failure remaps the slot to
    /// the placeholder and returns `None` for this call only.
    pub fn get(&mut self, index: u32) -> Option<&Bitmap> {
        if index as usize >= self.slots.len() {
            return None;
        }
        let resolved = self.data_index(index);
        if self.cache.exists(resolved) {
            return self.cache.get(resolved);
        }
        if self.slots[resolved as usize].asset {
            // The lazy load starts as a recorded cache miss.
            self.cache.get(resolved);
            return self.load_sprite(resolved);
        }
        None
    }

    /// Assign an externally supplied image to `index`, growing the table
    /// if needed. The slot becomes external and locked; the image is
    /// pinned in the cache until explicitly removed or disposed.
    pub fn set_sprite(&mut self, index: u32, image: Bitmap) -> Result<(), SpriteCacheError> {
        if self.enlarge_to(index).is_err() {
            error!("set_sprite: unable to use index {index}");
            return Err(SpriteCacheError::IndexOutOfRange {
                index,
                max: MAX_SPRITE_INDEX,
            });
        }
        self.infos[index as usize] = SpriteInfo::new(image.size(), image.depth());
        self.slots[index as usize] = SlotFlags {
            external: true,
            locked: true,
            ..Default::default()
        };
        self.cache.put(index, image, ItemFlags::EXTERNAL);
        debug!("set external sprite {index}");
        Ok(())
    }

    /// Mark `index` as a deliberately blank sprite: any resident image is
    /// freed and the slot is remapped to the placeholder. With `as_asset`
    /// set, the slot is still considered present in the game resources.
    pub fn set_empty_sprite(&mut self, index: u32, as_asset: bool) -> Result<(), SpriteCacheError> {
        if self.enlarge_to(index).is_err() {
            error!("set_empty_sprite: unable to use index {index}");
            return Err(SpriteCacheError::IndexOutOfRange {
                index,
                max: MAX_SPRITE_INDEX,
            });
        }
        self.cache.dispose(index);
        self.infos[index as usize] = SpriteInfo::default();
        self.slots[index as usize] = SlotFlags {
            asset: as_asset,
            ..Default::default()
        };
        self.remap_to_placeholder(index);
        Ok(())
    }

    /// Detach a sprite's image and hand ownership to the caller, leaving
    /// the slot empty with all flags cleared.
    pub fn remove_sprite(&mut self, index: u32) -> Option<Bitmap> {
        if index as usize >= self.slots.len() {
            return None;
        }
        let image = self.cache.remove(index);
        self.clear_slot(index);
        debug!("removed sprite {index}");
        image
    }

    /// Free a sprite's image and clear its slot.
    pub fn dispose_sprite(&mut self, index: u32) {
        if index as usize >= self.slots.len() {
            return;
        }
        self.cache.dispose(index);
        self.clear_slot(index);
        debug!("disposed sprite {index}");
    }

    /// Free every evictable cached image at once, e.g. on room change.
    /// Locked and external sprites stay resident.
    pub fn dispose_all_cached(&mut self) {
        self.cache.dispose_free_items();
    }

    /// Force-load a sprite and lock it so it survives future eviction.
    /// No-op for slots that are not asset-backed, since there is nothing
    /// to (re)load.
    pub fn precache(&mut self, index: u32) {
        if index as usize >= self.slots.len() {
            return;
        }
        if !self.slots[index as usize].asset {
            debug!("precache: sprite {index} is not asset-backed, nothing to load");
            return;
        }
        if !self.cache.exists(index) {
            self.load_sprite(index);
        }
        if self.cache.lock(index) {
            self.slots[index as usize].locked = true;
            debug!("precached sprite {index}");
        }
    }

    /// Grow the slot table to include `topmost`. Existing slots are
    /// untouched; the table never shrinks.
    pub fn enlarge_to(&mut self, topmost: u32) -> Result<u32, SpriteCacheError> {
        if topmost > MAX_SPRITE_INDEX {
            return Err(SpriteCacheError::IndexOutOfRange {
                index: topmost,
                max: MAX_SPRITE_INDEX,
            });
        }
        if (topmost as usize) < self.slots.len() {
            return Ok(topmost);
        }
        let new_size = topmost as usize + 1;
        self.infos.resize(new_size, SpriteInfo::default());
        self.slots.resize(new_size, SlotFlags::default());
        Ok(topmost)
    }

    /// Find the first empty slot at or above [`MIN_SPRITE_INDEX`], growing
    /// the table if every slot is taken. The placeholder id is never
    /// handed out, even on an empty table.
    ///
    /// Linear scan; acceptable at the table sizes the engine deals with,
    /// and callers may still assign arbitrary ids directly.
    pub fn free_index(&mut self) -> Result<u32, SpriteCacheError> {
        for i in MIN_SPRITE_INDEX as usize..self.slots.len() {
            if self.slots[i].is_empty() {
                self.infos[i] = SpriteInfo::default();
                self.slots[i] = SlotFlags::default();
                return Ok(i as u32);
            }
        }
        self.enlarge_to((self.slots.len() as u32).max(MIN_SPRITE_INDEX))
    }

    /// Write every sprite in the table to a new packed file.
    ///
    /// A slot "exists" in the output if it has a resident image or is
    /// asset-backed; non-resident asset images are loaded by the store
    /// during the write. Resident images run through the pre-save hook
    /// first. Works without an attached store, in which case only
    /// resident images are written.
    pub fn save_to_file(
        &mut self,
        path: &Path,
        index_path: Option<&Path>,
        options: SaveOptions,
    ) -> Result<StoreIndex, SpriteCacheError> {
        for i in 0..self.slots.len() {
            if let Some(image) = self.cache.peek_mut(i as u32) {
                self.hooks.pre_save(image);
            }
        }

        let cache = &self.cache;
        let mut entries: Vec<(bool, Option<&Bitmap>)> = Vec::with_capacity(self.slots.len());
        for (i, flags) in self.slots.iter().enumerate() {
            let image = cache.peek(i as u32);
            entries.push((image.is_some() || flags.asset, image));
        }

        match self.store.as_mut() {
            Some(store) => Ok(store.save(path, index_path, &entries, options)?),
            None => {
                let mut file = SpriteFile::new();
                Ok(file.save(path, index_path, &entries, options)?)
            }
        }
    }

    /// Statistics of the underlying budgeted cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Adjust the cache budget; shrinking evicts unpinned images
    /// immediately.
    pub fn set_memory_limit(&mut self, memory_limit: usize) {
        self.cache.set_memory_limit(memory_limit);
    }

    /// Resolve a potentially remapped id to the slot whose image backs it.
    fn data_index(&self, index: u32) -> u32 {
        if self.slots[index as usize].remapped {
            PLACEHOLDER_INDEX
        } else {
            index
        }
    }

    /// Load an asset-backed sprite into the cache. On any failure the
    /// slot is remapped to the placeholder and `None` is returned; the
    /// store is not retried on later calls.
    fn load_sprite(&mut self, index: u32) -> Option<&Bitmap> {
        debug_assert!(self.slots[index as usize].asset);

        let raw = match self.store.as_mut() {
            Some(store) => store.load_one(index),
            None => Err(AssetStoreError::NotOpen),
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to load sprite {index}: {err}; remapping to placeholder");
                self.remap_to_placeholder(index);
                return None;
            }
        };

        let depth = self.infos[index as usize].depth;
        let image = match self.hooks.convert(index, raw, depth) {
            Some(image) => image,
            None => {
                warn!("failed to initialize sprite {index}, remapping to placeholder");
                self.remap_to_placeholder(index);
                return None;
            }
        };

        // The post-conversion size can differ from the stored metrics.
        self.infos[index as usize] = SpriteInfo::new(image.size(), image.depth());

        let pin = if index == PLACEHOLDER_INDEX {
            ItemFlags::LOCKED
        } else {
            ItemFlags::NONE
        };
        self.cache.put(index, image, pin);
        self.slots[index as usize] = SlotFlags {
            asset: true,
            locked: index == PLACEHOLDER_INDEX,
            ..Default::default()
        };
        debug!(
            "loaded sprite {index}, cache now {} KB",
            self.cache.memory_used() / 1024
        );

        // The observer may rewrite pixels in place, but not size or flags.
        if let Some(image) = self.cache.peek_mut(index) {
            self.hooks.post_load(index, image);
        }
        self.cache.peek(index)
    }

    /// Redirect a broken slot to share the placeholder's image and
    /// metadata. The placeholder itself is never remapped.
    fn remap_to_placeholder(&mut self, index: u32) {
        if index == PLACEHOLDER_INDEX {
            return;
        }
        self.infos[index as usize] = self.infos[PLACEHOLDER_INDEX as usize];
        self.slots[index as usize].remapped = true;
        debug!("remapped sprite {index} to the placeholder");
    }

    fn clear_slot(&mut self, index: u32) {
        self.infos[index as usize] = SpriteInfo::default();
        self.slots[index as usize] = SlotFlags::default();
    }
}

impl Default for SpriteCache {
    fn default() -> Self {
        Self::new(Box::new(DefaultHooks))
    }
}
