//! Packed sprite file store.
//!
//! Binary layout of the data file:
//!
//! ```text
//! "SPRB" | version u16 | count u32
//! then per slot:
//!   present u8
//!   if present: width u32 | height u32 | bpp u8 | compression u8
//!               | payload_len u32 | payload bytes
//! ```
//!
//! The side index file (`"SPRX"`) repeats the count and stores, per present
//! slot, the data-file offset and metrics so `open` can report metrics
//! without scanning. A missing or stale index is rebuilt by scanning the
//! data file.
//!
//! All integers are little-endian.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::warn;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::bitmap::{Bitmap, ColorDepth, Size};
use crate::store::{
    AssetStore, AssetStoreError, Compression, IndexEntry, SaveOptions, StoreIndex,
};

const SPRITE_FILE_MAGIC: [u8; 4] = *b"SPRB";
const INDEX_FILE_MAGIC: [u8; 4] = *b"SPRX";
const SPRITE_FILE_VERSION: u16 = 1;

/// A packed sprite resource file, open for random-access reads.
///
/// Create one with [`SpriteFile::open`], or [`SpriteFile::new`] for a
/// closed store that can still write packed files from in-memory images.
#[derive(Default)]
pub struct SpriteFile {
    file: Option<BufReader<File>>,
    index: StoreIndex,
}

impl SpriteFile {
    /// A closed store. `load_one` and `metrics` fail until `open` succeeds,
    /// but `save` works from resident images alone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a packed file and read its index.
    ///
    /// When `index_path` is given and the index file matches the data
    /// file's slot count, metrics come from the index; otherwise the data
    /// file is scanned and the index rebuilt in memory.
    pub fn open(path: &Path, index_path: Option<&Path>) -> Result<Self, AssetStoreError> {
        let mut reader = BufReader::new(File::open(path)?);
        let count = read_data_header(&mut reader)?;

        let index = match index_path {
            Some(index_path) => match read_index_file(index_path, count) {
                Ok(index) => index,
                Err(err) => {
                    warn!("sprite index file unusable ({err}), rebuilding from data file");
                    reader.seek(SeekFrom::Start(data_header_len()))?;
                    scan_entries(&mut reader, count)?
                }
            },
            None => scan_entries(&mut reader, count)?,
        };

        Ok(Self {
            file: Some(reader),
            index,
        })
    }

    /// The in-memory index of the open file.
    pub fn index(&self) -> &StoreIndex {
        &self.index
    }
}

impl AssetStore for SpriteFile {
    fn sprite_count(&self) -> usize {
        self.index.sprite_count()
    }

    fn metrics(&self) -> Result<Vec<Option<Size>>, AssetStoreError> {
        if self.file.is_none() {
            return Err(AssetStoreError::NotOpen);
        }
        Ok(self.index.metrics())
    }

    fn load_one(&mut self, index: u32) -> Result<Bitmap, AssetStoreError> {
        let file = self.file.as_mut().ok_or(AssetStoreError::NotOpen)?;
        let entry = self
            .index
            .entries
            .get(index as usize)
            .ok_or(AssetStoreError::IndexOutOfRange {
                index,
                count: self.index.entries.len(),
            })?;
        let entry = entry.as_ref().ok_or(AssetStoreError::EmptySlot(index))?;

        file.seek(SeekFrom::Start(entry.offset))?;
        if read_u8(file)? == 0 {
            return Err(AssetStoreError::EmptySlot(index));
        }
        let width = read_u32(file)?;
        let height = read_u32(file)?;
        let bpp = read_u8(file)?;
        let compression_tag = read_u8(file)?;
        let payload_len = read_u32(file)?;

        let mut payload = vec![0u8; payload_len as usize];
        file.read_exact(&mut payload)?;

        let depth = ColorDepth::from_bytes_per_pixel(bpp)
            .ok_or_else(|| AssetStoreError::Corrupt(index, format!("bad bytes-per-pixel {bpp}")))?;
        let compression = Compression::from_u8(compression_tag).ok_or_else(|| {
            AssetStoreError::Corrupt(index, format!("unknown compression tag {compression_tag}"))
        })?;
        let pixels = match compression {
            Compression::None => payload,
            Compression::Lz4 => decompress_size_prepended(&payload)
                .map_err(|err| AssetStoreError::Corrupt(index, err.to_string()))?,
        };

        Bitmap::from_pixels(Size::new(width, height), depth, pixels).ok_or_else(|| {
            AssetStoreError::Corrupt(index, "pixel data does not match metrics".into())
        })
    }

    fn save(
        &mut self,
        path: &Path,
        index_path: Option<&Path>,
        entries: &[(bool, Option<&Bitmap>)],
        options: SaveOptions,
    ) -> Result<StoreIndex, AssetStoreError> {
        // Pull every missing asset image out of the currently open file up
        // front; entries the store cannot supply are written as empty.
        let mut loaded: Vec<Option<Bitmap>> = Vec::with_capacity(entries.len());
        for (i, &(exists, image)) in entries.iter().enumerate() {
            if exists && image.is_none() {
                loaded.push(self.load_one(i as u32).ok());
            } else {
                loaded.push(None);
            }
        }

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&SPRITE_FILE_MAGIC)?;
        write_u16(&mut writer, SPRITE_FILE_VERSION)?;
        write_u32(&mut writer, entries.len() as u32)?;

        let mut out_entries: Vec<Option<IndexEntry>> = Vec::with_capacity(entries.len());
        for (i, &(exists, image)) in entries.iter().enumerate() {
            let image = if image.is_some() {
                image
            } else {
                loaded[i].as_ref()
            };
            let offset = writer.stream_position()?;
            match (exists, image) {
                (true, Some(image)) => {
                    writer.write_all(&[1])?;
                    write_u32(&mut writer, image.width())?;
                    write_u32(&mut writer, image.height())?;
                    writer.write_all(&[image.depth().bytes_per_pixel() as u8])?;
                    writer.write_all(&[options.compression as u8])?;
                    let payload: Cow<[u8]> = match options.compression {
                        Compression::None => Cow::Borrowed(image.pixels()),
                        Compression::Lz4 => Cow::Owned(compress_prepend_size(image.pixels())),
                    };
                    write_u32(&mut writer, payload.len() as u32)?;
                    writer.write_all(&payload)?;
                    out_entries.push(Some(IndexEntry {
                        offset,
                        size: image.size(),
                        depth: image.depth(),
                    }));
                }
                _ => {
                    writer.write_all(&[0])?;
                    out_entries.push(None);
                }
            }
        }
        writer.flush()?;

        let index = StoreIndex {
            entries: out_entries,
        };
        if let Some(index_path) = index_path {
            write_index_file(index_path, &index)?;
        }
        Ok(index)
    }

    fn close(&mut self) {
        self.file = None;
        self.index = StoreIndex::default();
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

fn data_header_len() -> u64 {
    (SPRITE_FILE_MAGIC.len() + 2 + 4) as u64
}

fn read_data_header<R: Read>(reader: &mut R) -> Result<u32, AssetStoreError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != SPRITE_FILE_MAGIC {
        return Err(AssetStoreError::BadFormat("bad magic".into()));
    }
    let version = read_u16(reader)?;
    if version != SPRITE_FILE_VERSION {
        return Err(AssetStoreError::UnsupportedVersion(version));
    }
    Ok(read_u32(reader)?)
}

/// Build an index by walking the entry records. The reader must be
/// positioned at the first entry.
fn scan_entries<R: Read + Seek>(reader: &mut R, count: u32) -> Result<StoreIndex, AssetStoreError> {
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let offset = reader.stream_position()?;
        if read_u8(reader)? == 0 {
            entries.push(None);
            continue;
        }
        let width = read_u32(reader)?;
        let height = read_u32(reader)?;
        let bpp = read_u8(reader)?;
        let _compression = read_u8(reader)?;
        let payload_len = read_u32(reader)?;
        let depth = ColorDepth::from_bytes_per_pixel(bpp)
            .ok_or_else(|| AssetStoreError::Corrupt(i, format!("bad bytes-per-pixel {bpp}")))?;
        reader.seek(SeekFrom::Current(payload_len as i64))?;
        entries.push(Some(IndexEntry {
            offset,
            size: Size::new(width, height),
            depth,
        }));
    }
    Ok(StoreIndex { entries })
}

fn read_index_file(path: &Path, expected_count: u32) -> Result<StoreIndex, AssetStoreError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != INDEX_FILE_MAGIC {
        return Err(AssetStoreError::BadFormat("bad index magic".into()));
    }
    let version = read_u16(&mut reader)?;
    if version != SPRITE_FILE_VERSION {
        return Err(AssetStoreError::UnsupportedVersion(version));
    }
    let count = read_u32(&mut reader)?;
    if count != expected_count {
        return Err(AssetStoreError::BadFormat(format!(
            "index lists {count} slots, data file has {expected_count}"
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        if read_u8(&mut reader)? == 0 {
            entries.push(None);
            continue;
        }
        let offset = read_u64(&mut reader)?;
        let width = read_u32(&mut reader)?;
        let height = read_u32(&mut reader)?;
        let bpp = read_u8(&mut reader)?;
        let depth = ColorDepth::from_bytes_per_pixel(bpp)
            .ok_or_else(|| AssetStoreError::Corrupt(i, format!("bad bytes-per-pixel {bpp}")))?;
        entries.push(Some(IndexEntry {
            offset,
            size: Size::new(width, height),
            depth,
        }));
    }
    Ok(StoreIndex { entries })
}

fn write_index_file(path: &Path, index: &StoreIndex) -> Result<(), AssetStoreError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&INDEX_FILE_MAGIC)?;
    write_u16(&mut writer, SPRITE_FILE_VERSION)?;
    write_u32(&mut writer, index.entries.len() as u32)?;
    for entry in &index.entries {
        match entry {
            Some(entry) => {
                writer.write_all(&[1])?;
                write_u64(&mut writer, entry.offset)?;
                write_u32(&mut writer, entry.size.width)?;
                write_u32(&mut writer, entry.size.height)?;
                writer.write_all(&[entry.depth.bytes_per_pixel() as u8])?;
            }
            None => writer.write_all(&[0])?,
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_u16<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: u32, height: u32, depth: ColorDepth, fill: u8) -> Bitmap {
        let len = width as usize * height as usize * depth.bytes_per_pixel();
        Bitmap::from_pixels(Size::new(width, height), depth, vec![fill; len]).unwrap()
    }

    fn save_fixture(
        dir: &Path,
        compression: Compression,
    ) -> (std::path::PathBuf, std::path::PathBuf) {
        let path = dir.join("sprites.dat");
        let index_path = dir.join("sprites.idx");

        let a = filled(4, 4, ColorDepth::TrueColor32, 0xAA);
        let c = filled(8, 2, ColorDepth::HiColor16, 0xCC);
        let entries: Vec<(bool, Option<&Bitmap>)> = vec![
            (true, Some(&a)),
            (false, None),
            (true, Some(&c)),
            (false, None),
        ];

        let mut store = SpriteFile::new();
        store
            .save(&path, Some(&index_path), &entries, SaveOptions { compression })
            .expect("save should succeed");
        (path, index_path)
    }

    #[test]
    fn save_and_open_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let (path, index_path) = save_fixture(temp.path(), Compression::None);

        let mut store = SpriteFile::open(&path, Some(&index_path)).expect("open should succeed");
        let metrics = store.metrics().expect("metrics should be available");

        assert_eq!(metrics.len(), 4);
        assert_eq!(metrics[0], Some(Size::new(4, 4)));
        assert_eq!(metrics[1], None);
        assert_eq!(metrics[2], Some(Size::new(8, 2)));
        assert_eq!(metrics[3], None);

        let loaded = store.load_one(0).expect("slot 0 should load");
        assert_eq!(loaded.size(), Size::new(4, 4));
        assert_eq!(loaded.depth(), ColorDepth::TrueColor32);
        assert!(loaded.pixels().iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn lz4_payloads_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let (path, index_path) = save_fixture(temp.path(), Compression::Lz4);

        let mut store = SpriteFile::open(&path, Some(&index_path)).expect("open should succeed");
        let loaded = store.load_one(2).expect("slot 2 should load");
        assert_eq!(loaded.size(), Size::new(8, 2));
        assert!(loaded.pixels().iter().all(|&b| b == 0xCC));
    }

    #[test]
    fn empty_slot_reports_structured_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let (path, index_path) = save_fixture(temp.path(), Compression::None);

        let mut store = SpriteFile::open(&path, Some(&index_path)).expect("open should succeed");
        assert!(matches!(
            store.load_one(1),
            Err(AssetStoreError::EmptySlot(1))
        ));
        assert!(matches!(
            store.load_one(99),
            Err(AssetStoreError::IndexOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn missing_index_file_falls_back_to_scan() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let (path, index_path) = save_fixture(temp.path(), Compression::None);
        std::fs::remove_file(&index_path).expect("index file should be removable");

        let mut store = SpriteFile::open(&path, Some(&index_path)).expect("open should succeed");
        assert_eq!(store.sprite_count(), 4);
        let loaded = store.load_one(0).expect("slot 0 should load after rescan");
        assert_eq!(loaded.size(), Size::new(4, 4));
    }

    #[test]
    fn open_without_index_path_scans() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let (path, _) = save_fixture(temp.path(), Compression::Lz4);

        let mut store = SpriteFile::open(&path, None).expect("open should succeed");
        assert_eq!(store.metrics().unwrap()[2], Some(Size::new(8, 2)));
        assert!(store.load_one(2).is_ok());
    }

    #[test]
    fn open_rejects_foreign_files() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("garbage.dat");
        std::fs::write(&path, b"definitely not a sprite file").unwrap();

        assert!(matches!(
            SpriteFile::open(&path, None),
            Err(AssetStoreError::BadFormat(_))
        ));
    }

    #[test]
    fn save_pulls_missing_images_from_open_file() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let (path, index_path) = save_fixture(temp.path(), Compression::None);

        // Re-save from the open store without supplying any images; the
        // store must load them from its own file.
        let mut store = SpriteFile::open(&path, Some(&index_path)).expect("open should succeed");
        let entries: Vec<(bool, Option<&Bitmap>)> =
            vec![(true, None), (false, None), (true, None), (false, None)];
        let copy_path = temp.path().join("copy.dat");
        let index = store
            .save(&copy_path, None, &entries, SaveOptions::default())
            .expect("save should succeed");

        assert_eq!(index.metrics()[0], Some(Size::new(4, 4)));

        let mut copy = SpriteFile::open(&copy_path, None).expect("copy should open");
        let loaded = copy.load_one(0).expect("slot 0 should load from copy");
        assert!(loaded.pixels().iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn closed_store_saves_empty_for_unsupplied_assets() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("sprites.dat");

        let mut store = SpriteFile::new();
        assert!(!store.is_open());
        assert!(matches!(store.metrics(), Err(AssetStoreError::NotOpen)));

        let entries: Vec<(bool, Option<&Bitmap>)> = vec![(true, None)];
        let index = store
            .save(&path, None, &entries, SaveOptions::default())
            .expect("save should succeed");
        assert_eq!(index.metrics(), vec![None]);
    }

    #[test]
    fn close_is_redundant_safe() {
        let mut store = SpriteFile::new();
        store.close();
        store.close();
        assert!(!store.is_open());
        assert_eq!(store.sprite_count(), 0);
    }
}
