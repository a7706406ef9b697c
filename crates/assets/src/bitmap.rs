//! Shared sprite pixel-buffer and metadata types.

use sprite_engine_cache::CacheSize;

/// Sprite dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True for the zero size used to mark empty slots.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel bit depth of a sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    /// 8-bit palette-indexed.
    Indexed8,
    /// 16-bit high color.
    HiColor16,
    /// 32-bit true color.
    TrueColor32,
}

impl ColorDepth {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorDepth::Indexed8 => 1,
            ColorDepth::HiColor16 => 2,
            ColorDepth::TrueColor32 => 4,
        }
    }

    pub fn from_bytes_per_pixel(bpp: u8) -> Option<Self> {
        match bpp {
            1 => Some(ColorDepth::Indexed8),
            2 => Some(ColorDepth::HiColor16),
            4 => Some(ColorDepth::TrueColor32),
            _ => None,
        }
    }
}

impl Default for ColorDepth {
    /// The engine's native depth.
    fn default() -> Self {
        ColorDepth::TrueColor32
    }
}

/// A decoded sprite pixel buffer.
///
/// The buffer length is always `width * height * bytes_per_pixel`; the
/// constructors enforce it, so budget accounting can trust the metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    size: Size,
    depth: ColorDepth,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Create a zero-filled bitmap.
    pub fn new(size: Size, depth: ColorDepth) -> Self {
        let len = size.width as usize * size.height as usize * depth.bytes_per_pixel();
        Self {
            size,
            depth,
            pixels: vec![0; len],
        }
    }

    /// Wrap an existing pixel buffer.
    ///
    /// Returns `None` if the buffer length does not match the metrics.
    pub fn from_pixels(size: Size, depth: ColorDepth, pixels: Vec<u8>) -> Option<Self> {
        let expected = size.width as usize * size.height as usize * depth.bytes_per_pixel();
        if pixels.len() != expected {
            return None;
        }
        Some(Self {
            size,
            depth,
            pixels,
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn depth(&self) -> ColorDepth {
        self.depth
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access for in-place transforms. The buffer length is
    /// fixed; transforms rewrite content, never dimensions.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Payload size in bytes (`width * height * bytes_per_pixel`).
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

impl CacheSize for Bitmap {
    fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_filled_bitmap_matches_metrics() {
        let bmp = Bitmap::new(Size::new(16, 8), ColorDepth::TrueColor32);
        assert_eq!(bmp.byte_size(), 16 * 8 * 4);
        assert!(bmp.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_pixels_rejects_wrong_length() {
        let pixels = vec![0u8; 10];
        assert!(Bitmap::from_pixels(Size::new(4, 4), ColorDepth::Indexed8, pixels).is_none());

        let pixels = vec![0u8; 16];
        assert!(Bitmap::from_pixels(Size::new(4, 4), ColorDepth::Indexed8, pixels).is_some());
    }

    #[test]
    fn depth_round_trips_through_bpp() {
        for depth in [
            ColorDepth::Indexed8,
            ColorDepth::HiColor16,
            ColorDepth::TrueColor32,
        ] {
            let bpp = depth.bytes_per_pixel() as u8;
            assert_eq!(ColorDepth::from_bytes_per_pixel(bpp), Some(depth));
        }
        assert_eq!(ColorDepth::from_bytes_per_pixel(3), None);
    }

    #[test]
    fn empty_size_marker() {
        assert!(Size::default().is_empty());
        assert!(Size::new(0, 10).is_empty());
        assert!(!Size::new(1, 1).is_empty());
    }
}
